use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{self, RootCertStore, ServerConfig};

use crate::config::TlsConfig;

/// Default trust material compiled into the binary, analogous to embedding
/// test certificates in the image. Replace via the `[tls]` config section.
pub const CA_CERT_DER: &[u8] = include_bytes!("../../certs/ca_cert.der");
pub const SERVER_CERT_DER: &[u8] = include_bytes!("../../certs/server_cert.der");
pub const SERVER_KEY_DER: &[u8] = include_bytes!("../../certs/server_key.der");

/// One variant per trust artifact so startup logs name exactly which load
/// step failed.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("CA certificate rejected: {0}")]
    CaCertificate(String),
    #[error("server certificate rejected: {0}")]
    ServerCertificate(String),
    #[error("server private key rejected: {0}")]
    PrivateKey(String),
    #[error("TLS context construction failed: {0}")]
    Context(String),
}

/// Shared TLS server configuration: trust anchor, certificate chain, key and
/// protocol policy. Built once at startup, read-only afterward; every
/// handshake clones the inner `Arc`, and the configuration is freed when the
/// last clone drops at shutdown.
#[derive(Debug)]
pub struct TlsContext {
    config: Arc<ServerConfig>,
}

impl TlsContext {
    /// Load trust material per the config section, falling back to the
    /// embedded buffers for any path left unset.
    pub fn from_config(tls: &TlsConfig) -> Result<Self, TlsError> {
        let ca = read_artifact(&tls.ca_cert, CA_CERT_DER, TlsError::CaCertificate)?;
        let cert = read_artifact(&tls.server_cert, SERVER_CERT_DER, TlsError::ServerCertificate)?;
        let key = read_artifact(&tls.server_key, SERVER_KEY_DER, TlsError::PrivateKey)?;
        Self::from_der(&ca, &cert, &key)
    }

    /// Build the server configuration from DER-encoded trust material.
    ///
    /// The CA becomes a trust anchor for optional client certificates;
    /// clients are accepted unauthenticated. Protocol policy is TLS 1.3/1.2.
    pub fn from_der(ca: &[u8], cert: &[u8], key: &[u8]) -> Result<Self, TlsError> {
        let mut roots = RootCertStore::empty();
        roots
            .add(CertificateDer::from(ca.to_vec()))
            .map_err(|e| TlsError::CaCertificate(e.to_string()))?;

        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .allow_unauthenticated()
            .build()
            .map_err(|e| TlsError::Context(e.to_string()))?;

        let key = PrivateKeyDer::try_from(key.to_vec())
            .map_err(|e| TlsError::PrivateKey(e.to_string()))?;
        let cert_chain = vec![CertificateDer::from(cert.to_vec())];

        let config = ServerConfig::builder_with_protocol_versions(&[
            &rustls::version::TLS13,
            &rustls::version::TLS12,
        ])
        .with_client_cert_verifier(verifier)
        .with_single_cert(cert_chain, key)
        .map_err(|e| TlsError::ServerCertificate(e.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(self.config.clone())
    }
}

fn read_artifact(
    path: &Option<PathBuf>,
    embedded: &[u8],
    wrap: fn(String) -> TlsError,
) -> Result<Vec<u8>, TlsError> {
    match path {
        Some(p) => std::fs::read(p).map_err(|e| wrap(format!("{}: {}", p.display(), e))),
        None => Ok(embedded.to_vec()),
    }
}
