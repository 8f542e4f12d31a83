use std::time::Duration;

use thiserror::Error;

use common::JobId;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid client state: {0}")]
    InvalidState(&'static str),

    #[error("no operations specified; nothing to run")]
    EmptyPipeline,

    #[error("to run any task requires data; parallelize something first")]
    MissingData,

    #[error("not connected to a coordinator; connect first")]
    NotConnected,

    #[error("job {0} is executing; wait until it has finished")]
    JobInProgress(JobId),

    #[error("job {id} did not complete within {after:?}")]
    Timeout { id: JobId, after: Duration },

    #[error("lost the connection to the coordinator")]
    Disconnected,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
