//! A Glint worker: joins a coordinator with a memory budget and runs the
//! shards it is handed.

pub mod core;

pub use crate::core::{GlintWorker, WorkerConfig};
