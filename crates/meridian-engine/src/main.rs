//! Matching engine process.
//!
//! One book per configured symbol behind the order manager, served over a
//! unix domain socket to the gateway.

mod manager;
mod server;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use manager::OrderManager;
use server::EngineServer;

/// Symbols configured at startup; each gets its own book.
const DEFAULT_SYMBOLS: &[&str] = &["AAPL", "GOOGL", "MSFT", "AMZN", "TSLA"];

#[derive(Parser)]
#[command(name = "meridian-engine", version, about = "Matching engine server")]
struct Args {
    /// Unix domain socket path for the gateway link
    #[arg(default_value = "/tmp/matching_engine.sock")]
    socket_path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .context("failed to install signal handler")?;
    }

    let mut manager = OrderManager::new();
    for symbol in DEFAULT_SYMBOLS {
        manager.add_symbol(symbol);
    }
    info!(symbols = DEFAULT_SYMBOLS.len(), "engine configured");

    let mut server = EngineServer::bind(&args.socket_path)?;
    server.run(&mut manager, &shutdown)?;

    let stats = manager.statistics();
    info!(
        received = stats.total_orders_received,
        accepted = stats.total_orders_accepted,
        rejected = stats.total_orders_rejected,
        cancelled = stats.total_orders_cancelled,
        expired = stats.total_orders_expired,
        executions = stats.total_executions,
        volume = stats.total_volume,
        "final statistics"
    );
    info!("shutdown complete");
    Ok(())
}
