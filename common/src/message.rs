//! The wire envelope. One [`Message`] is one logical message before chunking.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::job::{JobId, JobStatus, Operation, ShardOutput, WorkerID};

/// A row of the coordinator's job table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub status: JobStatus,
}

/// A row of the coordinator's worker registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub worker_id: WorkerID,
    pub max_mem: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Message {
    /// Client submits a job.
    JobRequest {
        id: JobId,
        operations: Vec<Operation>,
        #[serde(default)]
        data: Option<Vec<Value>>,
    },

    /// Coordinator acknowledges a submission.
    JobResponse { id: JobId },

    /// Coordinator reports a job reached a terminal state.
    JobComplete {
        id: JobId,
        status: JobStatus,
        #[serde(default)]
        data: Option<Value>,
    },

    /// First message on a worker connection.
    WorkerJoin { max_mem: u64 },

    /// Coordinator's answer to [`Message::WorkerJoin`].
    WorkerAccepted { worker_id: WorkerID },

    /// Coordinator hands a shard to a worker.
    ShardRequest {
        job_id: JobId,
        shard: usize,
        offset: usize,
        operations: Vec<Operation>,
        data: Vec<Value>,
    },

    ShardResult {
        job_id: JobId,
        shard: usize,
        worker_id: WorkerID,
        output: ShardOutput,
    },

    ShardFailed {
        job_id: JobId,
        shard: usize,
        worker_id: WorkerID,
        reason: String,
    },

    JobsRequest,

    JobsResponse { jobs: Vec<JobSummary> },

    StatusRequest,

    StatusResponse { workers: Vec<WorkerSummary> },
}

impl Message {
    /// The `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::JobRequest { .. } => "job-request",
            Message::JobResponse { .. } => "job-response",
            Message::JobComplete { .. } => "job-complete",
            Message::WorkerJoin { .. } => "worker-join",
            Message::WorkerAccepted { .. } => "worker-accepted",
            Message::ShardRequest { .. } => "shard-request",
            Message::ShardResult { .. } => "shard-result",
            Message::ShardFailed { .. } => "shard-failed",
            Message::JobsRequest => "jobs-request",
            Message::JobsResponse { .. } => "jobs-response",
            Message::StatusRequest => "status-request",
            Message::StatusResponse { .. } => "status-response",
        }
    }
}
