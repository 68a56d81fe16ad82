//! Gateway process: accepts TCP clients and bridges them to the engine.

mod gateway;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gateway::Gateway;

#[derive(Parser)]
#[command(name = "meridian-gateway", version, about = "Client gateway server")]
struct Args {
    /// TCP port to listen on
    #[arg(default_value_t = 8080)]
    port: u16,

    /// Path to the engine's unix socket
    #[arg(default_value = "/tmp/matching_engine.sock")]
    engine_socket: PathBuf,
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

    info!(port = args.port, engine = %args.engine_socket.display(), "starting gateway");

    let mut gateway = Gateway::connect(args.port, &args.engine_socket)?;
    gateway.run(&shutdown)?;

    info!("shutdown complete");
    Ok(())
}
