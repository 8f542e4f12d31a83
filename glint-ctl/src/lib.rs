//! Client library and command line tool for a Glint cluster.

pub mod client;
pub mod error;

pub use client::{GlintClient, JobOutcome};
pub use error::ClientError;
