//! DeFi event indexer binary
//!
//! Wires the chain client, projection store, registry, and poller together
//! and runs the scan loop until interrupted. Tuning comes from TIDEMARK_*
//! environment variables; the CLI only carries operational paths.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tidemark::config::Config;
use tidemark::normalize::Normalizer;
use tidemark::price::TokenPricer;
use tidemark::projector::Projector;
use tidemark::registry::Registry;
use tidemark::rpc::ChainClient;
use tidemark::store::RocksProjectionStore;
use tidemark::{Poller, PollerSettings};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// On-chain DeFi event indexer
#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Index DeFi platform events into profile, analytics, and leaderboard projections")]
struct Args {
    /// Path to RocksDB database directory
    #[arg(short, long, default_value = "./projection_db")]
    db_path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    info!("Starting DeFi event indexer");
    info!("RPC endpoint: {}", config.rpc_url);
    info!("Database: {:?}", args.db_path);

    // No chain connection at startup means nothing to index: fatal.
    let chain = Arc::new(
        ChainClient::connect(&config.rpc_url, config.rpc_bearer.clone())
            .await
            .context("Failed to connect to chain RPC")?,
    );

    let store = Arc::new(
        RocksProjectionStore::open(&args.db_path)
            .with_context(|| format!("Failed to open database at {:?}", args.db_path))?,
    );

    let registry = Registry::from_config(&config);
    if registry.is_empty() {
        anyhow::bail!("No valid watched contracts configured");
    }

    let pricer = Arc::new(TokenPricer::new(
        config.token_symbols.clone(),
        config.price_api_url.clone(),
        config.price_api_key.clone(),
        Duration::from_secs(config.price_ttl_secs),
    ));
    let projector = Projector::new(store.clone(), Normalizer::new(chain.clone()), pricer);
    let poller = Poller::new(
        chain,
        registry,
        projector,
        store,
        PollerSettings::from(&config),
    );

    // Clean shutdown: flip the signal and let the in-flight tick finish
    // its current chunk before the loop exits. An early poller exit
    // (panic or error) must end the process instead of leaving a binary
    // that indexes nothing.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut poller_task = tokio::spawn(async move { poller.run(shutdown_rx).await });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Received Ctrl+C, shutting down gracefully...");
            let _ = shutdown_tx.send(true);
            poller_task
                .await
                .context("Poller task panicked")?
                .context("Poller error")?;
        }
        result = &mut poller_task => {
            result.context("Poller task panicked")?.context("Poller error")?;
            anyhow::bail!("Poller exited before shutdown was requested");
        }
    }

    info!("Indexer stopped");
    Ok(())
}
