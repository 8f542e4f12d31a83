use anyhow::{bail, Context, Result};
use bytesize::ByteSize;
use serde_json::Value;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use common::connection::{self, MessageReader};
use common::{JobId, Message, Operation, Outbox, WorkerID, DEFAULT_CHUNK_SIZE};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Largest projected shard size, in bytes, this worker accepts.
    pub max_mem: u64,

    /// Chunk size used for everything this worker sends.
    pub chunk_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_mem: ByteSize::gib(1).as_u64(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// A worker that has been accepted by a coordinator.
pub struct GlintWorker {
    id: WorkerID,
    reader: MessageReader,
    outbox: Outbox,
}

impl GlintWorker {
    /// Connect to the coordinator at `addr` and announce `config.max_mem`.
    pub async fn join(addr: impl ToSocketAddrs, config: &WorkerConfig) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .context("failed to connect to the coordinator")?;
        let (mut reader, writer) = connection::split(stream, config.chunk_size);
        let outbox = writer.spawn();

        outbox
            .send(Message::WorkerJoin {
                max_mem: config.max_mem,
            })
            .context("connection to the coordinator closed")?;

        let id = match reader.recv().await? {
            Some(Message::WorkerAccepted { worker_id }) => worker_id,
            Some(other) => bail!("expected worker-accepted, got `{}`", other.kind()),
            None => bail!("coordinator closed the connection before accepting"),
        };
        info!(
            "Worker registered (ID={id}, max_mem={})",
            ByteSize(config.max_mem)
        );

        Ok(Self { id, reader, outbox })
    }

    pub fn id(&self) -> WorkerID {
        self.id
    }

    /// Run shards until the coordinator goes away or `shutdown` fires.
    /// Shards already started are finished and answered first.
    pub async fn serve(mut self, shutdown: CancellationToken) -> Result<()> {
        let tracker = TaskTracker::new();

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.reader.recv() => received,
            };

            match received? {
                Some(Message::ShardRequest {
                    job_id,
                    shard,
                    offset,
                    operations,
                    data,
                }) => {
                    debug!(
                        "Received shard {shard} of job {job_id} ({} element(s))",
                        data.len()
                    );
                    tracker.spawn(run_shard(
                        self.id,
                        self.outbox.clone(),
                        ShardWork {
                            job_id,
                            shard,
                            offset,
                            operations,
                            data,
                        },
                    ));
                }
                Some(other) => warn!("Ignoring unexpected `{}` message", other.kind()),
                None => {
                    info!("Coordinator closed the connection.");
                    break;
                }
            }
        }

        tracker.close();
        tracker.wait().await;
        info!("Worker {} exited.", self.id);
        Ok(())
    }
}

struct ShardWork {
    job_id: JobId,
    shard: usize,
    offset: usize,
    operations: Vec<Operation>,
    data: Vec<Value>,
}

/// Run the pipeline off the reactor and report back.
async fn run_shard(worker_id: WorkerID, outbox: Outbox, work: ShardWork) {
    let ShardWork {
        job_id,
        shard,
        offset,
        operations,
        data,
    } = work;

    let outcome =
        tokio::task::spawn_blocking(move || workload::execute(&operations, data, offset)).await;

    let reply = match outcome {
        Ok(Ok(output)) => {
            debug!("Shard {shard} of job {job_id} done");
            Message::ShardResult {
                job_id,
                shard,
                worker_id,
                output,
            }
        }
        Ok(Err(e)) => {
            warn!("Shard {shard} of job {job_id} failed: {e:#}");
            Message::ShardFailed {
                job_id,
                shard,
                worker_id,
                reason: format!("{e:#}"),
            }
        }
        Err(e) => Message::ShardFailed {
            job_id,
            shard,
            worker_id,
            reason: format!("shard task did not finish: {e}"),
        },
    };

    if outbox.send(reply).is_err() {
        warn!("Lost the coordinator before answering shard {shard} of job {job_id}");
    }
}
