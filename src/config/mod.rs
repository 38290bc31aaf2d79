use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub tls: TlsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_port: u16,
    pub backlog: i32,
    pub recv_buffer_size: usize,
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_port: 1000,
            backlog: 2,
            recv_buffer_size: 256,
            max_sessions: 32,
        }
    }
}

/// Paths to DER-encoded trust material. Any path left unset falls back to
/// the material compiled into the binary.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TlsConfig {
    pub ca_cert: Option<PathBuf>,
    pub server_cert: Option<PathBuf>,
    pub server_key: Option<PathBuf>,
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
