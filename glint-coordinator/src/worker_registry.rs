use tracing::info;

use common::{Outbox, WorkerID, WorkerSummary};

use crate::worker_info::*;

/// Registry for workers.
///
/// Owned by the coordinator behind an `RwLock`; executors read a
/// [`WorkerRegistry::snapshot`] under the read lock, connections add and
/// remove themselves under the write lock.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    /// Next ID to hand out. IDs are never reused.
    next_worker_id: WorkerID,

    /// Connected workers, in registration order.
    worker_list: Vec<WorkerInfo>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add worker to the registry and return its ID.
    pub fn register_worker(&mut self, max_mem: u64, outbox: Outbox) -> WorkerID {
        let worker_id = self.next_worker_id;
        self.next_worker_id += 1;

        self.worker_list
            .push(WorkerInfo::new(worker_id, max_mem, outbox));
        info!("Worker registered (ID={worker_id}, max_mem={max_mem})");

        worker_id
    }

    /// Remove worker from the registry. Returns whether it was present.
    pub fn delete_worker(&mut self, worker_id: WorkerID) -> bool {
        let before = self.worker_list.len();
        self.worker_list.retain(|worker| worker.id != worker_id);

        let removed = self.worker_list.len() != before;
        if removed {
            info!("Worker left (ID={worker_id})");
        }
        removed
    }

    /// Capacities of every worker, in registration order.
    pub fn snapshot(&self) -> Vec<WorkerCapacity> {
        self.worker_list.iter().map(WorkerInfo::capacity).collect()
    }

    pub fn summaries(&self) -> Vec<WorkerSummary> {
        self.worker_list
            .iter()
            .map(|worker| WorkerSummary {
                worker_id: worker.id,
                max_mem: worker.max_mem,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.worker_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worker_list.is_empty()
    }

    pub fn get_worker(&self, worker_id: WorkerID) -> Option<&WorkerInfo> {
        self.worker_list.iter().find(|worker| worker.id == worker_id)
    }
}
