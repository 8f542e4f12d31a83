use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use glint_worker::{GlintWorker, WorkerConfig};

mod args;
use args::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = WorkerConfig {
        max_mem: args.max_mem.as_u64(),
        chunk_size: args.chunk_size,
    };
    let worker = GlintWorker::join(args.address.as_str(), &config).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match signal::ctrl_c().await {
                Ok(()) => info!("Worker server exited..."),
                // we also shut down in case of error
                Err(err) => error!("Unable to listen for shutdown signal: {err}"),
            }
            shutdown.cancel();
        }
    });

    worker.serve(shutdown).await
}
