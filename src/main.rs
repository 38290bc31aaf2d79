use anyhow::Result;
use tracing::{error, info};

use echod::config::Config;
use echod::listener::Listener;
use echod::tls::TlsContext;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("echod=debug,info")
        .init();

    info!("Starting echod TLS echo server");

    // every fatal path funnels here: listener and TLS context drop, which
    // closes the listen socket and frees the shared configuration once
    if let Err(e) = run().await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading config from {}", path);
            Config::from_file(&path)?
        }
        None => Config::default(),
    };

    let ctx = TlsContext::from_config(&config.tls)?;
    info!("TLS context ready");

    let listener = Listener::bind(&config.server, &ctx)?;
    listener.run().await?;
    Ok(())
}
