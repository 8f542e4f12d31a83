mod args;

use std::net::SocketAddr;

use args::Args;
use clap::Parser;
use glint_coordinator::{Coordinator, CoordinatorConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // Note: There are default values for EACH argument.
    let args = Args::parse();

    let config = CoordinatorConfig {
        addr: SocketAddr::new(args.host, args.port),
        chunk_size: args.chunk_size,
    };
    let coordinator = Coordinator::init(config).await?;

    tokio::signal::ctrl_c().await?;
    info!("Received ctrl-c.");
    coordinator.shutdown().await;

    Ok(())
}
