use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use common::connection::{self, MessageReader};
use common::{JobId, JobStatus, Message, Outbox, WorkerID, DEFAULT_CHUNK_SIZE};

use crate::dispatch::{DispatchError, RemoteDispatcher};
use crate::executor::Executor;
use crate::jobs::{Job, JobInFlight, JobTable};
use crate::worker_registry::WorkerRegistry;

pub const DEFAULT_PORT: u16 = 8030;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Address the listener binds. Port 0 picks a free one.
    pub addr: SocketAddr,

    /// Chunk size used for everything this coordinator sends.
    pub chunk_size: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0, 0, 0, 0, 1], DEFAULT_PORT)),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// State shared between the accept loop, connection handlers and jobs.
struct Shared {
    registry: Arc<RwLock<WorkerRegistry>>,
    dispatcher: Arc<RemoteDispatcher>,
    jobs: JobTable,
    chunk_size: usize,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

/// A running coordinator: accepts workers and clients, schedules jobs.
pub struct Coordinator {
    addr: SocketAddr,
    shared: Arc<Shared>,
}

impl Coordinator {
    /// Bind the listener and start accepting connections.
    pub async fn init(config: CoordinatorConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.addr)
            .await
            .with_context(|| format!("failed to bind {}", config.addr))?;
        let addr = listener.local_addr()?;
        info!("Coordinator listening on {addr}");

        let registry = Arc::new(RwLock::new(WorkerRegistry::new()));
        let shared = Arc::new(Shared {
            dispatcher: Arc::new(RemoteDispatcher::new(registry.clone())),
            registry,
            jobs: JobTable::new(),
            chunk_size: config.chunk_size,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        });

        shared.tracker.spawn(accept_loop(listener, shared.clone()));

        Ok(Self { addr, shared })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting, close every connection and wait for all tasks.
    ///
    /// Jobs still running are marked `TERMINATED`.
    pub async fn shutdown(&self) {
        info!("Coordinator shutting down.");
        self.shared.shutdown.cancel();
        self.shared.tracker.close();
        self.shared.tracker.wait().await;
    }

    /// Start executing a job in the background and return its ID. Refused
    /// while a job with the same ID is still running.
    pub fn process_job(&self, job: Job) -> Result<JobId, JobInFlight> {
        self.shared.spawn_job(job, None)
    }

    /// False for unknown jobs.
    pub fn is_job_running(&self, id: &JobId) -> bool {
        self.shared
            .jobs
            .get(id)
            .is_some_and(|record| record.is_running())
    }

    pub fn job_status(&self, id: &JobId) -> Option<JobStatus> {
        self.shared.jobs.get(id).map(|record| record.status())
    }

    /// The merged result, once the job is `DONE`.
    pub fn job_result(&self, id: &JobId) -> Option<Value> {
        self.shared
            .jobs
            .get(id)
            .and_then(|record| record.result().cloned())
    }

    pub async fn worker_count(&self) -> usize {
        self.shared.registry.read().await.len()
    }
}

impl Shared {
    /// Run a job on the tracker. With `notify`, a `job-complete` goes out
    /// once the job is terminal.
    fn spawn_job(&self, job: Job, notify: Option<Outbox>) -> Result<JobId, JobInFlight> {
        let id = job.id;
        let executor = Executor::new(Some(job), self.registry.clone(), self.dispatcher.clone());
        let record = executor.record();
        if let Err(e) = self.jobs.insert(id, record.clone()) {
            warn!("Refusing job: {e}");
            return Err(e);
        }
        info!("Job {id} accepted.");

        let shutdown = self.shutdown.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                outcome = executor.execute() => {
                    if let Err(e) = outcome {
                        debug!("Job {id} ended early: {e}");
                    }
                }
                _ = shutdown.cancelled() => {
                    warn!("Job {id} cut short by shutdown.");
                    record.advance(JobStatus::Terminated);
                }
            }

            if let Some(outbox) = notify {
                let complete = Message::JobComplete {
                    id,
                    status: record.status(),
                    data: record.result().cloned(),
                };
                if outbox.send(complete).is_err() {
                    debug!("Client of job {id} is gone, result not delivered.");
                }
            }
        });

        Ok(id)
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Connection from {peer}");
                    shared.tracker.spawn(handle_connection(stream, shared.clone()));
                }
                Err(e) => warn!("Failed to accept a connection: {e}"),
            },
        }
    }
    debug!("Accept loop stopped.");
}

/// The first message decides what the peer is: `worker-join` makes it a
/// worker, anything else a client.
async fn handle_connection(stream: TcpStream, shared: Arc<Shared>) {
    let (mut reader, writer) = connection::split(stream, shared.chunk_size);
    let outbox = writer.spawn();

    let first = match next_message(&mut reader, &shared.shutdown).await {
        Some(message) => message,
        None => return,
    };

    match first {
        Message::WorkerJoin { max_mem } => serve_worker(reader, outbox, max_mem, &shared).await,
        message => serve_client(reader, outbox, message, &shared).await,
    }
}

/// `None` on shutdown, a closed connection or a protocol error.
async fn next_message(reader: &mut MessageReader, shutdown: &CancellationToken) -> Option<Message> {
    tokio::select! {
        _ = shutdown.cancelled() => None,
        received = reader.recv() => match received {
            Ok(message) => message,
            Err(e) => {
                error!("Dropping connection: {e}");
                None
            }
        },
    }
}

async fn serve_worker(mut reader: MessageReader, outbox: Outbox, max_mem: u64, shared: &Shared) {
    let worker_id = shared
        .registry
        .write()
        .await
        .register_worker(max_mem, outbox.clone());

    if outbox.send(Message::WorkerAccepted { worker_id }).is_err() {
        shared.registry.write().await.delete_worker(worker_id);
        return;
    }

    while let Some(message) = next_message(&mut reader, &shared.shutdown).await {
        handle_worker_message(worker_id, message, shared);
    }

    shared.registry.write().await.delete_worker(worker_id);
    // On shutdown the jobs end as TERMINATED instead.
    if !shared.shutdown.is_cancelled() {
        shared.dispatcher.fail_worker(worker_id);
    }
}

fn handle_worker_message(worker_id: WorkerID, message: Message, shared: &Shared) {
    match message {
        Message::ShardResult {
            job_id,
            shard,
            output,
            ..
        } => {
            debug!("Worker {worker_id} finished shard {shard} of job {job_id}");
            shared.dispatcher.complete(job_id, shard, Ok(output));
        }
        Message::ShardFailed {
            job_id,
            shard,
            reason,
            ..
        } => {
            warn!("Worker {worker_id} failed shard {shard} of job {job_id}: {reason}");
            let failure = DispatchError::ShardFailed {
                worker: worker_id,
                shard,
                reason,
            };
            shared.dispatcher.complete(job_id, shard, Err(failure));
        }
        other => warn!("Unexpected `{}` from worker {worker_id}", other.kind()),
    }
}

async fn serve_client(mut reader: MessageReader, outbox: Outbox, first: Message, shared: &Shared) {
    let mut next = Some(first);
    while let Some(message) = next {
        if !handle_client_message(message, &outbox, shared).await {
            break;
        }
        next = next_message(&mut reader, &shared.shutdown).await;
    }
    debug!("Client disconnected.");
}

/// Returns false once the client's outbox is closed.
async fn handle_client_message(message: Message, outbox: &Outbox, shared: &Shared) -> bool {
    let reply = match message {
        Message::JobRequest {
            id,
            operations,
            data,
        } => {
            // The acknowledgement must go out before the job can complete.
            if outbox.send(Message::JobResponse { id }).is_err() {
                return false;
            }
            let job = Job::new(id, operations, data);
            if shared.spawn_job(job, Some(outbox.clone())).is_ok() {
                return true;
            }
            // The running job keeps its ID; the duplicate is answered on its own.
            Message::JobComplete {
                id,
                status: JobStatus::BadJob,
                data: None,
            }
        }
        Message::JobsRequest => Message::JobsResponse {
            jobs: shared.jobs.summaries(),
        },
        Message::StatusRequest => Message::StatusResponse {
            workers: shared.registry.read().await.summaries(),
        },
        other => {
            warn!("Unexpected `{}` from a client", other.kind());
            return true;
        }
    };

    outbox.send(reply).is_ok()
}
