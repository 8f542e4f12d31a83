use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;

use common::{JobId, JobStatus, JobSummary, Operation, Task};

use crate::partition;

/// Why a job failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidJob {
    #[error("the job has no operations")]
    NoOperations,

    #[error("operation {position} (reduce `{name}`) has no start value")]
    MissingStart { position: usize, name: String },

    #[error("operation {position} ({task} `{name}`) must not carry a start value")]
    UnexpectedStart {
        position: usize,
        task: Task,
        name: String,
    },

    #[error("operation {position}: `{name}` is not a known {task} function")]
    UnknownFunction {
        position: usize,
        task: Task,
        name: String,
    },

    #[error("operation {position}: `{name}` takes {expected} argument(s), {given} given")]
    WrongArity {
        position: usize,
        name: String,
        expected: usize,
        given: usize,
    },

    #[error("operation {position} is a reduce but not the last operation")]
    ReduceNotLast { position: usize },
}

/// A job was submitted under the ID of one that has not finished yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("job {0} is already running")]
pub struct JobInFlight(pub JobId);

/// A submitted job, as the coordinator received it.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,

    /// Shared read-only with every shard.
    pub operations: Arc<Vec<Operation>>,

    pub data: Option<Vec<Value>>,
}

impl Job {
    pub fn new(id: JobId, operations: Vec<Operation>, data: Option<Vec<Value>>) -> Self {
        Self {
            id,
            operations: Arc::new(operations),
            data,
        }
    }

    /// Check the pipeline's shape against the function catalog.
    pub fn validate(&self) -> Result<(), InvalidJob> {
        if self.operations.is_empty() {
            return Err(InvalidJob::NoOperations);
        }

        let last = self.operations.len() - 1;
        for (position, op) in self.operations.iter().enumerate() {
            let name = op.function.name.clone();

            match (op.task, &op.start) {
                (Task::Reduce, None) => return Err(InvalidJob::MissingStart { position, name }),
                (task @ (Task::Map | Task::Filter), Some(_)) => {
                    return Err(InvalidJob::UnexpectedStart {
                        position,
                        task,
                        name,
                    })
                }
                _ => {}
            }

            if op.task == Task::Reduce && position != last {
                return Err(InvalidJob::ReduceNotLast { position });
            }

            let workload = workload::try_named(op.task, &name).ok_or_else(|| {
                InvalidJob::UnknownFunction {
                    position,
                    task: op.task,
                    name: name.clone(),
                }
            })?;

            if workload.arity != op.function.args.len() {
                return Err(InvalidJob::WrongArity {
                    position,
                    name,
                    expected: workload.arity,
                    given: op.function.args.len(),
                });
            }
        }

        Ok(())
    }

    /// Bytes of the dataset's compact JSON form. Zero without a dataset.
    pub fn projected_size(&self) -> u64 {
        self.data
            .as_deref()
            .map_or(0, |data| partition::slice_size(&partition::element_sizes(data)))
    }
}

/// Lock-free holder of a job's status.
///
/// Once a terminal status is stored it never changes.
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(encode(JobStatus::Pending)))
    }

    pub fn get(&self) -> JobStatus {
        decode(self.0.load(Ordering::Acquire))
    }

    /// Move from `from` to `to` only if the status is still `from`.
    pub fn transition(&self, from: JobStatus, to: JobStatus) -> bool {
        self.0
            .compare_exchange(encode(from), encode(to), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Move to `next`. Returns false, leaving the status alone, when the
    /// current status is terminal.
    pub fn advance(&self, next: JobStatus) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (!decode(current).is_terminal()).then_some(encode(next))
            })
            .is_ok()
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

fn encode(status: JobStatus) -> u8 {
    match status {
        JobStatus::Pending => 0,
        JobStatus::Validating => 1,
        JobStatus::Running => 2,
        JobStatus::Done => 3,
        JobStatus::BadJob => 4,
        JobStatus::Terminated => 5,
    }
}

fn decode(raw: u8) -> JobStatus {
    match raw {
        0 => JobStatus::Pending,
        1 => JobStatus::Validating,
        2 => JobStatus::Running,
        3 => JobStatus::Done,
        4 => JobStatus::BadJob,
        _ => JobStatus::Terminated,
    }
}

/// The coordinator's view of one job: identity, status and, once done, the
/// merged result.
#[derive(Debug, Default)]
pub struct JobRecord {
    id: Option<JobId>,
    status: StatusCell,
    result: OnceLock<Value>,
}

impl JobRecord {
    pub fn new(id: Option<JobId>) -> Self {
        Self {
            id,
            status: StatusCell::new(),
            result: OnceLock::new(),
        }
    }

    /// `None` when no job was supplied at all.
    pub fn id(&self) -> Option<JobId> {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status.get()
    }

    pub fn is_running(&self) -> bool {
        !self.status().is_terminal()
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.get()
    }

    /// Claim the job for execution: `PENDING` to `VALIDATING`, once.
    pub(crate) fn begin(&self) -> bool {
        self.status.transition(JobStatus::Pending, JobStatus::Validating)
    }

    pub(crate) fn advance(&self, next: JobStatus) -> bool {
        self.status.advance(next)
    }

    /// Store the result and mark the job done.
    pub(crate) fn complete(&self, result: Value) -> bool {
        if self.result.set(result).is_err() {
            return false;
        }
        self.advance(JobStatus::Done)
    }
}

/// Every job the coordinator has seen, kept for status queries.
#[derive(Debug, Default)]
pub struct JobTable {
    records: DashMap<JobId, (u64, Arc<JobRecord>)>,
    next_seq: AtomicU64,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `record` under `id`. A finished job with the same ID is
    /// replaced; one still running is kept and the new record refused.
    pub fn insert(&self, id: JobId, record: Arc<JobRecord>) -> Result<(), JobInFlight> {
        match self.records.entry(id) {
            Entry::Occupied(existing) if existing.get().1.is_running() => Err(JobInFlight(id)),
            Entry::Occupied(mut existing) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                existing.insert((seq, record));
                Ok(())
            }
            Entry::Vacant(slot) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                slot.insert((seq, record));
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &JobId) -> Option<Arc<JobRecord>> {
        self.records.get(id).map(|entry| entry.1.clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All jobs in submission order.
    pub fn summaries(&self) -> Vec<JobSummary> {
        let mut rows: Vec<(u64, JobSummary)> = self
            .records
            .iter()
            .map(|entry| {
                let (seq, record) = entry.value();
                (
                    *seq,
                    JobSummary {
                        id: *entry.key(),
                        status: record.status(),
                    },
                )
            })
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, summary)| summary).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Function;
    use serde_json::json;
    use uuid::Uuid;

    fn job(operations: Vec<Operation>) -> Job {
        Job::new(Uuid::new_v4(), operations, Some(vec![json!(1)]))
    }

    #[test]
    fn terminal_status_sticks() {
        let cell = StatusCell::new();
        assert_eq!(cell.get(), JobStatus::Pending);
        assert!(cell.advance(JobStatus::Validating));
        assert!(cell.advance(JobStatus::BadJob));
        assert!(!cell.advance(JobStatus::Running));
        assert_eq!(cell.get(), JobStatus::BadJob);
    }

    #[test]
    fn every_status_survives_the_cell() {
        for status in [
            JobStatus::Pending,
            JobStatus::Validating,
            JobStatus::Running,
            JobStatus::Done,
            JobStatus::BadJob,
            JobStatus::Terminated,
        ] {
            assert_eq!(decode(encode(status)), status);
        }
    }

    #[test]
    fn validation() {
        assert_eq!(job(vec![]).validate(), Err(InvalidJob::NoOperations));

        let mut reduce = Operation::reduce(Function::named("sum"), 0);
        reduce.start = None;
        assert!(matches!(
            job(vec![reduce]).validate(),
            Err(InvalidJob::MissingStart { position: 0, .. })
        ));

        let mut map = Operation::map(Function::named("double"));
        map.start = Some(json!(0));
        assert!(matches!(
            job(vec![map]).validate(),
            Err(InvalidJob::UnexpectedStart { .. })
        ));

        assert!(matches!(
            job(vec![Operation::map(Function::named("launch_missiles"))]).validate(),
            Err(InvalidJob::UnknownFunction { .. })
        ));

        assert!(matches!(
            job(vec![Operation::filter(Function::named("gt"))]).validate(),
            Err(InvalidJob::WrongArity {
                expected: 1,
                given: 0,
                ..
            })
        ));

        assert_eq!(
            job(vec![
                Operation::reduce(Function::named("sum"), 0),
                Operation::map(Function::named("double")),
            ])
            .validate(),
            Err(InvalidJob::ReduceNotLast { position: 0 })
        );

        assert_eq!(
            job(vec![
                Operation::map(Function::named("double")),
                Operation::filter(Function::named("gt").with_arg(3)),
                Operation::reduce(Function::named("sum"), 0),
            ])
            .validate(),
            Ok(())
        );
    }

    #[test]
    fn projected_size_is_the_json_length() {
        let j = Job::new(Uuid::new_v4(), vec![], Some(vec![json!(1), json!("ab"), json!(300)]));
        assert_eq!(j.projected_size(), r#"[1,"ab",300]"#.len() as u64);

        let j = Job::new(Uuid::new_v4(), vec![], None);
        assert_eq!(j.projected_size(), 0);
    }

    #[test]
    fn table_lists_in_submission_order() {
        let table = JobTable::new();
        let ids: Vec<_> = (0..5).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            table.insert(*id, Arc::new(JobRecord::new(Some(*id)))).unwrap();
        }
        let listed: Vec<_> = table.summaries().into_iter().map(|s| s.id).collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn running_job_id_cannot_be_reused() {
        let table = JobTable::new();
        let id = Uuid::new_v4();
        let first = Arc::new(JobRecord::new(Some(id)));
        table.insert(id, first.clone()).unwrap();

        let second = Arc::new(JobRecord::new(Some(id)));
        assert_eq!(table.insert(id, second), Err(JobInFlight(id)));
        assert!(Arc::ptr_eq(&table.get(&id).unwrap(), &first));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn finished_job_id_can_be_reused() {
        let table = JobTable::new();
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let first = Arc::new(JobRecord::new(Some(id)));
        table.insert(id, first.clone()).unwrap();
        table.insert(other, Arc::new(JobRecord::new(Some(other)))).unwrap();
        assert!(first.advance(JobStatus::BadJob));

        let second = Arc::new(JobRecord::new(Some(id)));
        table.insert(id, second.clone()).unwrap();
        assert!(Arc::ptr_eq(&table.get(&id).unwrap(), &second));
        assert_eq!(table.get(&id).unwrap().status(), JobStatus::Pending);

        // The resubmission lists after the jobs that came before it.
        let listed: Vec<_> = table.summaries().into_iter().map(|s| s.id).collect();
        assert_eq!(listed, vec![other, id]);
    }
}
