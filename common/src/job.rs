use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Client-assigned job identity, opaque to the coordinator.
pub type JobId = Uuid;

/// Coordinator-assigned worker identity.
pub type WorkerID = u32;

/// Lifecycle of a job on the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Received, not looked at yet.
    Pending,

    /// Checking the job's shape before scheduling it.
    Validating,

    /// Shards are out on workers.
    Running,

    /// All shards merged, result available.
    Done,

    /// The job was malformed, could not be placed, or a shard failed.
    BadJob,

    /// There was no job, or no dataset, to execute.
    Terminated,
}

impl JobStatus {
    /// Terminal states never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::BadJob | JobStatus::Terminated)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Validating => "VALIDATING",
            JobStatus::Running => "RUNNING",
            JobStatus::Done => "DONE",
            JobStatus::BadJob => "BAD_JOB",
            JobStatus::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}

/// Kind of a pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Map,
    Filter,
    Reduce,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Map => f.write_str("map"),
            Task::Filter => f.write_str("filter"),
            Task::Reduce => f.write_str("reduce"),
        }
    }
}

/// A transformation, named from the `workload` catalog, with its bound
/// arguments. Only the name and arguments travel; workers look the code up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
}

impl Function {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Bind one more argument.
    pub fn with_arg(mut self, arg: impl Into<Value>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

/// One pipeline step.
///
/// `start` is the reduce seed and is present iff `task` is [`Task::Reduce`].
/// A JSON `null` seed reads back as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub task: Task,

    /// The step's function. Named `data` on the wire.
    #[serde(rename = "data")]
    pub function: Function,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Value>,
}

impl Operation {
    pub fn map(function: Function) -> Self {
        Self {
            task: Task::Map,
            function,
            start: None,
        }
    }

    pub fn filter(function: Function) -> Self {
        Self {
            task: Task::Filter,
            function,
            start: None,
        }
    }

    pub fn reduce(function: Function, start: impl Into<Value>) -> Self {
        Self {
            task: Task::Reduce,
            function,
            start: Some(start.into()),
        }
    }

    /// Whether the seed is present exactly when the step is a reduce.
    pub fn is_well_formed(&self) -> bool {
        self.start.is_some() == (self.task == Task::Reduce)
    }
}

/// What a worker returns for one shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardOutput {
    /// The shard's surviving elements, in partition order.
    Elements(Vec<Value>),

    /// The shard's local reduction.
    Reduced(Value),
}
