use bytesize::ByteSize;
use clap::Parser;

use common::DEFAULT_CHUNK_SIZE;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// The address of the coordinator server
    #[arg(short = 'j', long = "join", default_value = "[::1]:8030")]
    pub address: String,

    /// Largest shard this worker takes on, e.g. `512MiB` or `2GB`.
    #[arg(short, long, default_value = "1GiB")]
    pub max_mem: ByteSize,

    /// Largest payload, in bytes, of a single frame sent by the worker.
    #[arg(short, long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
}
