//! Drives one job from submission to a terminal status.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use common::{JobId, JobStatus};

use crate::dispatch::{DispatchError, Shard, ShardDispatcher};
use crate::jobs::{InvalidJob, Job, JobRecord};
use crate::partition::{self, PlanError};
use crate::worker_registry::WorkerRegistry;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("no job provided for execution")]
    NoJob,

    #[error("job {0} has no data")]
    MissingData(JobId),

    #[error("job {id} is not valid: {source}")]
    Invalid {
        id: JobId,
        #[source]
        source: InvalidJob,
    },

    #[error(transparent)]
    NoCapacity(#[from] PlanError),

    #[error("job {id} lost a shard: {source}")]
    Shard {
        id: JobId,
        #[source]
        source: DispatchError,
    },

    #[error("job {id} could not merge shard results: {reason}")]
    Merge { id: JobId, reason: String },

    #[error("job has already been executed")]
    AlreadyExecuted,
}

/// Encapsulation layer that corresponds to running an entire job.
pub struct Executor {
    job: Option<Job>,
    record: Arc<JobRecord>,
    registry: Arc<RwLock<WorkerRegistry>>,
    dispatcher: Arc<dyn ShardDispatcher>,
}

impl Executor {
    pub fn new(
        job: Option<Job>,
        registry: Arc<RwLock<WorkerRegistry>>,
        dispatcher: Arc<dyn ShardDispatcher>,
    ) -> Self {
        let record = Arc::new(JobRecord::new(job.as_ref().map(|job| job.id)));
        Self {
            job,
            record,
            registry,
            dispatcher,
        }
    }

    /// Shared view of the job's status and result.
    pub fn record(&self) -> Arc<JobRecord> {
        self.record.clone()
    }

    pub fn id(&self) -> Option<JobId> {
        self.record.id()
    }

    pub fn status(&self) -> JobStatus {
        self.record.status()
    }

    pub fn is_running(&self) -> bool {
        self.record.is_running()
    }

    pub fn result(&self) -> Option<&Value> {
        self.record.result()
    }

    /// Validate, place, dispatch, wait for every shard, merge.
    ///
    /// Every failure leaves the job in a terminal status as well as being
    /// returned.
    pub async fn execute(&self) -> Result<(), ExecutorError> {
        if !self.record.begin() {
            return Err(ExecutorError::AlreadyExecuted);
        }

        let Some(job) = self.job.as_ref() else {
            error!("No job provided for execution, terminating.");
            self.record.advance(JobStatus::Terminated);
            return Err(ExecutorError::NoJob);
        };

        let Some(data) = job.data.as_deref() else {
            error!("Job {} has no data, terminating.", job.id);
            self.record.advance(JobStatus::Terminated);
            return Err(ExecutorError::MissingData(job.id));
        };

        if let Err(source) = job.validate() {
            error!("Job {} was not valid: {source}", job.id);
            self.record.advance(JobStatus::BadJob);
            return Err(ExecutorError::Invalid { id: job.id, source });
        }

        self.record.advance(JobStatus::Running);
        debug!(
            "Job {} is valid, processing. Going to split up data of size {}",
            job.id,
            data.len()
        );

        let sizes = partition::element_sizes(data);
        let workers = self.registry.read().await.snapshot();
        debug!(
            "Job size: {} bytes, spreading across {} worker(s).",
            partition::slice_size(&sizes),
            workers.len()
        );

        let plan = match partition::plan(&sizes, &workers) {
            Ok(plan) => plan,
            Err(e) => {
                error!("Job {}: {e}", job.id);
                self.record.advance(JobStatus::BadJob);
                return Err(e.into());
            }
        };
        info!("Job {} split into {} shard(s).", job.id, plan.len());

        let shards = plan.into_iter().enumerate().map(|(index, assignment)| Shard {
            job_id: job.id,
            index,
            offset: assignment.range.start,
            data: data[assignment.range].to_vec(),
            operations: job.operations.clone(),
            worker: assignment.worker,
        });

        let outcomes = join_all(shards.map(|shard| self.dispatcher.dispatch(shard))).await;

        let mut partials = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok(output) => partials.push(output),
                Err(source) => {
                    error!("Job {}: {source}", job.id);
                    self.record.advance(JobStatus::BadJob);
                    return Err(ExecutorError::Shard { id: job.id, source });
                }
            }
        }

        let merged = match workload::merge(&job.operations, partials) {
            Ok(merged) => merged,
            Err(e) => {
                let reason = format!("{e:#}");
                error!("Job {}: failed to merge: {reason}", job.id);
                self.record.advance(JobStatus::BadJob);
                return Err(ExecutorError::Merge { id: job.id, reason });
            }
        };

        self.record.complete(merged);
        info!("Job {} done.", job.id);
        Ok(())
    }
}
