//! Getting shards to workers and their results back.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, warn};

use common::{JobId, Message, Operation, ShardOutput, WorkerID};

use crate::worker_registry::WorkerRegistry;

/// A contiguous slice of a job's dataset bound to one worker.
#[derive(Debug, Clone)]
pub struct Shard {
    pub job_id: JobId,

    /// Position in the job's plan; results merge in this order.
    pub index: usize,

    /// Index of `data[0]` in the job's dataset.
    pub offset: usize,

    pub data: Vec<Value>,

    pub operations: Arc<Vec<Operation>>,

    pub worker: WorkerID,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("worker {0} is not connected")]
    WorkerGone(WorkerID),

    #[error("worker {worker} failed shard {shard}: {reason}")]
    ShardFailed {
        worker: WorkerID,
        shard: usize,
        reason: String,
    },
}

/// Runs one shard somewhere and hands back its output.
#[async_trait]
pub trait ShardDispatcher: Send + Sync {
    async fn dispatch(&self, shard: Shard) -> Result<ShardOutput, DispatchError>;
}

type ShardKey = (JobId, usize);

type Waiter = oneshot::Sender<Result<ShardOutput, DispatchError>>;

/// Dispatches over worker connections found in the registry.
///
/// Each in-flight shard parks a oneshot sender keyed by job and shard index;
/// the worker's connection handler resolves it through [`RemoteDispatcher::complete`],
/// or through [`RemoteDispatcher::fail_worker`] when the worker goes away.
pub struct RemoteDispatcher {
    registry: Arc<RwLock<WorkerRegistry>>,
    pending: DashMap<ShardKey, (WorkerID, Waiter)>,
}

impl RemoteDispatcher {
    pub fn new(registry: Arc<RwLock<WorkerRegistry>>) -> Self {
        Self {
            registry,
            pending: DashMap::new(),
        }
    }

    /// Deliver a worker's answer for a shard. Unknown shards are ignored.
    pub fn complete(&self, job_id: JobId, shard: usize, outcome: Result<ShardOutput, DispatchError>) {
        match self.pending.remove(&(job_id, shard)) {
            Some((_, (_, sender))) => {
                // The executor may have gone away; nothing to do then.
                let _ = sender.send(outcome);
            }
            None => warn!("Result for unknown shard {shard} of job {job_id}"),
        }
    }

    /// Fail every shard still waiting on `worker`. Call once the worker is
    /// out of the registry so no new shard can reach it.
    pub fn fail_worker(&self, worker: WorkerID) -> usize {
        let keys: Vec<ShardKey> = self
            .pending
            .iter()
            .filter(|entry| entry.value().0 == worker)
            .map(|entry| *entry.key())
            .collect();

        let mut failed = 0;
        for key in keys {
            if let Some((_, (_, sender))) = self.pending.remove(&key) {
                let _ = sender.send(Err(DispatchError::WorkerGone(worker)));
                failed += 1;
            }
        }
        if failed > 0 {
            warn!("Worker {worker} left with {failed} shard(s) in flight.");
        }
        failed
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl ShardDispatcher for RemoteDispatcher {
    async fn dispatch(&self, shard: Shard) -> Result<ShardOutput, DispatchError> {
        let key = (shard.job_id, shard.index);
        let (sender, receiver) = oneshot::channel();
        self.pending.insert(key, (shard.worker, sender));

        let request = Message::ShardRequest {
            job_id: shard.job_id,
            shard: shard.index,
            offset: shard.offset,
            operations: shard.operations.as_ref().clone(),
            data: shard.data,
        };

        let sent = {
            let registry = self.registry.read().await;
            registry
                .get_worker(shard.worker)
                .is_some_and(|worker| worker.send(request))
        };
        if !sent {
            self.pending.remove(&key);
            return Err(DispatchError::WorkerGone(shard.worker));
        }
        debug!(
            "Shard {} of job {} sent to worker {}",
            shard.index, shard.job_id, shard.worker
        );

        receiver
            .await
            .unwrap_or(Err(DispatchError::WorkerGone(shard.worker)))
    }
}
