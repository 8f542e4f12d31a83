mod args;
use args::{parse_args, Commands};

mod core;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = parse_args();

    match args.command {
        Commands::Jobs => core::jobs(&args.address).await?,
        Commands::Status => core::status(&args.address).await?,
        Commands::Submit {
            input,
            pipeline,
            timeout,
        } => core::submit(&args.address, &input, &pipeline, timeout).await?,
    }

    Ok(())
}
