use std::path::PathBuf;

use exchange_node::{build_supervisor, NodeConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = NodeConfig::load(std::env::args_os().nth(1).map(PathBuf::from))?;
    info!(
        data_dir = %config.data_dir.display(),
        storage = ?config.storage,
        registry = ?config.registry,
        "Starting exchange node"
    );

    let mut supervisor = build_supervisor(&config);
    tokio::select! {
        result = supervisor.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    supervisor.shutdown();

    Ok(())
}
