use common::{Message, Outbox, WorkerID};

/// A connected worker.
#[derive(Debug, Clone)]
pub struct WorkerInfo {
    /// Unique ID for each worker, in registration order.
    pub id: WorkerID,

    /// Largest projected shard size, in bytes, the worker accepts.
    pub max_mem: u64,

    /// Messages for the worker's connection.
    pub outbox: Outbox,
}

impl WorkerInfo {
    pub fn new(id: WorkerID, max_mem: u64, outbox: Outbox) -> Self {
        Self {
            id,
            max_mem,
            outbox,
        }
    }

    /// Queue a message for the worker. False once its connection is gone.
    pub fn send(&self, message: Message) -> bool {
        self.outbox.send(message).is_ok()
    }

    pub fn capacity(&self) -> WorkerCapacity {
        WorkerCapacity {
            id: self.id,
            max_mem: self.max_mem,
        }
    }
}

/// What scheduling needs to know about a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerCapacity {
    pub id: WorkerID,
    pub max_mem: u64,
}
