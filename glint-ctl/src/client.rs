//! The client side of Glint: build a pipeline, submit it, wait for the result.
//!
//! ```no_run
//! # async fn demo() -> Result<(), glint_ctl::ClientError> {
//! use glint_ctl::GlintClient;
//! use common::Function;
//! use serde_json::json;
//!
//! let mut client = GlintClient::new();
//! client.connect("[::1]:8030").await?;
//! client
//!     .parallelize(vec![json!(1), json!(2), json!(3)])?
//!     .map(Function::named("add").with_arg(324))
//!     .reduce(Function::named("sum"), 0);
//! client.run()?;
//! let outcome = client.wait_for_job().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use common::connection;
use common::{
    Function, JobId, JobStatus, JobSummary, Message, Operation, Outbox, WorkerSummary,
    DEFAULT_CHUNK_SIZE,
};

use crate::error::ClientError;

/// How a submitted job ended.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub id: JobId,
    pub status: JobStatus,

    /// The merged result; only a `DONE` job has one.
    pub data: Option<Value>,
}

struct Connection {
    outbox: Outbox,

    /// Everything the coordinator sends, in order, forwarded by the reader task.
    inbox: mpsc::UnboundedReceiver<Message>,
}

pub struct GlintClient {
    /// ID the next submission goes out under. A fresh one after every reset.
    id: JobId,

    chunk_size: usize,
    data: Option<Vec<Value>>,
    operations: Vec<Operation>,

    /// The job submitted by `run` and not yet waited for.
    running: Option<JobId>,

    /// Completions that arrived while waiting for something else.
    completed: HashMap<JobId, JobOutcome>,

    connection: Option<Connection>,
}

impl Default for GlintClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GlintClient {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            chunk_size,
            data: None,
            operations: Vec::new(),
            running: None,
            completed: HashMap::new(),
            connection: None,
        }
    }

    /// Open the connection to the coordinator.
    pub async fn connect(&mut self, addr: impl ToSocketAddrs) -> Result<(), ClientError> {
        let stream = TcpStream::connect(addr).await?;
        let (mut reader, writer) = connection::split(stream, self.chunk_size);
        let outbox = writer.spawn();

        let (forward, inbox) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                match reader.recv().await {
                    Ok(Some(message)) => {
                        if forward.send(message).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Client disconnected.");
                        break;
                    }
                    Err(e) => {
                        error!("Client connection failed: {e}");
                        break;
                    }
                }
            }
        });

        info!("Glint client connected to the coordinator.");
        self.connection = Some(Connection { outbox, inbox });
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|connection| !connection.outbox.is_closed())
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Set the dataset the pipeline runs over.
    pub fn parallelize(&mut self, data: Vec<Value>) -> Result<&mut Self, ClientError> {
        if self.running.is_some() {
            return Err(ClientError::InvalidState(
                "cannot change the data while a job is running",
            ));
        }
        self.data = Some(data);
        Ok(self)
    }

    pub fn map(&mut self, function: Function) -> &mut Self {
        self.operations.push(Operation::map(function));
        self
    }

    /// `function` sees each element and its index in the dataset.
    pub fn filter(&mut self, function: Function) -> &mut Self {
        self.operations.push(Operation::filter(function));
        self
    }

    /// The reducer should be associative with `start` as its identity, since
    /// each shard reduces from `start` before the shard values are combined.
    pub fn reduce(&mut self, function: Function, start: impl Into<Value>) -> &mut Self {
        self.operations.push(Operation::reduce(function, start));
        self
    }

    /// The `job-request` that [`GlintClient::run`] would send right now.
    pub fn job_request(&self) -> Message {
        Message::JobRequest {
            id: self.id,
            operations: self.operations.clone(),
            data: self.data.clone(),
        }
    }

    /// Submit the pipeline. Returns as soon as the request is queued; use
    /// [`GlintClient::wait_for_job`] for the outcome.
    pub fn run(&mut self) -> Result<JobId, ClientError> {
        if let Some(id) = self.running {
            return Err(ClientError::JobInProgress(id));
        }
        if self.operations.is_empty() {
            return Err(ClientError::EmptyPipeline);
        }
        if self.data.is_none() {
            return Err(ClientError::MissingData);
        }
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let request = self.job_request();
        let connection = self.connection.as_ref().ok_or(ClientError::NotConnected)?;
        debug!("Sending job request {} to the coordinator.", self.id);
        connection
            .outbox
            .send(request)
            .map_err(|_| ClientError::Disconnected)?;

        self.running = Some(self.id);
        Ok(self.id)
    }

    /// Clear the data and operations so a new job can be built.
    pub fn reset(&mut self) -> Result<(), ClientError> {
        if let Some(id) = self.running {
            warn!("A job is executing; wait until it has finished to reset.");
            return Err(ClientError::JobInProgress(id));
        }
        self.id = Uuid::new_v4();
        self.data = None;
        self.operations.clear();
        Ok(())
    }

    /// Wait for the running job's `job-complete`.
    pub async fn wait_for_job(&mut self) -> Result<JobOutcome, ClientError> {
        let id = self
            .running
            .ok_or(ClientError::InvalidState("no job is running"))?;

        loop {
            if let Some(outcome) = self.completed.remove(&id) {
                info!("Job {id} completed with status {}.", outcome.status);
                self.running = None;
                return Ok(outcome);
            }

            match self.next_message().await {
                Ok(message) => self.stash(message),
                Err(e) => {
                    // No completion can arrive any more.
                    self.running = None;
                    return Err(e);
                }
            }
        }
    }

    /// Like [`GlintClient::wait_for_job`], but gives up after `after`. The job
    /// stays in flight and can be waited for again.
    pub async fn wait_for_job_timeout(&mut self, after: Duration) -> Result<JobOutcome, ClientError> {
        let id = self
            .running
            .ok_or(ClientError::InvalidState("no job is running"))?;

        match tokio::time::timeout(after, self.wait_for_job()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ClientError::Timeout { id, after }),
        }
    }

    /// Every job the coordinator knows, in submission order.
    pub async fn jobs(&mut self) -> Result<Vec<JobSummary>, ClientError> {
        self.send(Message::JobsRequest)?;
        loop {
            match self.next_message().await? {
                Message::JobsResponse { jobs } => return Ok(jobs),
                other => self.stash(other),
            }
        }
    }

    /// The coordinator's registered workers.
    pub async fn status(&mut self) -> Result<Vec<WorkerSummary>, ClientError> {
        self.send(Message::StatusRequest)?;
        loop {
            match self.next_message().await? {
                Message::StatusResponse { workers } => return Ok(workers),
                other => self.stash(other),
            }
        }
    }

    fn send(&self, message: Message) -> Result<(), ClientError> {
        let connection = self.connection.as_ref().ok_or(ClientError::NotConnected)?;
        connection
            .outbox
            .send(message)
            .map_err(|_| ClientError::Disconnected)
    }

    /// Cancel safe.
    async fn next_message(&mut self) -> Result<Message, ClientError> {
        let connection = self.connection.as_mut().ok_or(ClientError::NotConnected)?;
        connection.inbox.recv().await.ok_or(ClientError::Disconnected)
    }

    /// Keep completions for later, drop the rest.
    fn stash(&mut self, message: Message) {
        match message {
            Message::JobComplete { id, status, data } => {
                debug!("Job {id} completed, holding the outcome.");
                self.completed.insert(id, JobOutcome { id, status, data });
            }
            Message::JobResponse { id } => debug!("Coordinator accepted job {id}."),
            other => warn!("Ignoring unexpected `{}` message", other.kind()),
        }
    }
}
