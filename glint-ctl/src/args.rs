use std::path::PathBuf;

use clap::{Parser, Subcommand};

//
// For parsing user specified command.
//
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// The address of the coordinator server.
    #[arg(short, long, default_value = "[::1]:8030", global = true)]
    pub address: String,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List all jobs which have been submitted to the system and their statuses.
    Jobs,
    /// Display the workers registered with the coordinator and their memory.
    Status,
    /// Submit a job to the cluster and print its outcome.
    Submit {
        /// JSON file holding the dataset, an array of elements.
        #[arg(short, long)]
        input: PathBuf,

        /// JSON file holding the pipeline, an array of operations such as
        /// `{"task": "map", "data": {"name": "add", "args": [3]}}`.
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Seconds to wait for the job before giving up.
        #[arg(short, long)]
        timeout: Option<u64>,
    },
}

/// Parse the user command.
/// Can be 1 of 3:
/// - submit
/// - status
/// - jobs
pub fn parse_args() -> Args {
    Args::parse()
}
