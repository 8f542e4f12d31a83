use std::net::IpAddr;

use clap::Parser;

use common::DEFAULT_CHUNK_SIZE;
use glint_coordinator::DEFAULT_PORT;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// The address for the server to listen on.
    #[arg(long, default_value = "::1")]
    pub host: IpAddr,

    /// The port for the server to run on.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Largest payload, in bytes, of a single frame sent by the coordinator.
    #[arg(short, long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
}
