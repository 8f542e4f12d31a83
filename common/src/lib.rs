//! Glint: a distributed data-parallel execution engine.
//!
//! Clients build a pipeline of map, filter and reduce steps over a dataset and
//! submit it to a coordinator, which splits the dataset across the connected
//! workers by their advertised memory and merges what they send back.
//!
//! This crate holds what every process shares: the job data model, the wire
//! envelope, and the chunked transport that carries both over TCP.

pub mod codec;
pub mod connection;
pub mod job;
pub mod message;

pub use codec::{ChunkError, Chunker, Frame};
pub use connection::{MessageReader, MessageWriter, Outbox};
pub use job::{Function, JobId, JobStatus, Operation, ShardOutput, Task, WorkerID};
pub use message::{JobSummary, Message, WorkerSummary};

/// Any element a dataset can carry.
pub use serde_json::Value;

/// Frame payload size used when nothing else is configured.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1000;

/// Hard upper bound of a single length-delimited frame on the wire.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Largest chunk size that still fits a chunk frame under [`MAX_FRAME_LENGTH`].
///
/// JSON string escaping can at most double the payload, plus the frame's own
/// envelope fields.
pub const MAX_CHUNK_SIZE: usize = MAX_FRAME_LENGTH / 2 - 1024;
