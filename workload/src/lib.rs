//! The functions a Glint pipeline may name, and the code that runs a pipeline
//! over a partition of data.
//!
//! Functions never travel over the wire. An [`Operation`] names one of the
//! functions registered here and carries its arguments as JSON; workers and
//! the coordinator resolve the name with [`try_named`].

use anyhow::{anyhow, bail, Result};
use serde_json::Value;

use common::{Operation, Task};

pub mod filter;
pub mod map;
mod num;
pub mod pipeline;
pub mod reduce;

pub use pipeline::{execute, merge, reference};

/// A map function takes an element and the step's arguments.
pub type MapFn = fn(element: &Value, args: &[Value]) -> Result<Value>;

/// A filter function takes an element, the position of that element in the
/// job's dataset, and the step's arguments.
pub type FilterFn = fn(element: &Value, index: usize, args: &[Value]) -> Result<bool>;

/// A reduce function folds one element into the accumulator.
pub type ReduceFn = fn(accumulator: Value, element: &Value, args: &[Value]) -> Result<Value>;

#[derive(Copy, Clone)]
pub enum Kernel {
    Map(MapFn),
    Filter(FilterFn),
    Reduce(ReduceFn),
}

/// A registered function.
#[derive(Copy, Clone)]
pub struct Workload {
    pub name: &'static str,

    /// Number of arguments the function must be given.
    pub arity: usize,

    pub kernel: Kernel,
}

/// Look up the function `name` registered for `task`.
pub fn try_named(task: Task, name: &str) -> Option<Workload> {
    match task {
        Task::Map => map::try_named(name).map(|(name, arity, f)| Workload {
            name,
            arity,
            kernel: Kernel::Map(f),
        }),
        Task::Filter => filter::try_named(name).map(|(name, arity, f)| Workload {
            name,
            arity,
            kernel: Kernel::Filter(f),
        }),
        Task::Reduce => reduce::try_named(name).map(|(name, arity, f)| Workload {
            name,
            arity,
            kernel: Kernel::Reduce(f),
        }),
    }
}

/// An operation resolved against the registry.
pub(crate) struct Step<'a> {
    pub kernel: Kernel,
    pub args: &'a [Value],
    pub start: Value,
}

pub(crate) fn bind(op: &Operation) -> Result<Step<'_>> {
    let workload = try_named(op.task, &op.function.name)
        .ok_or_else(|| anyhow!("`{}` is not a known {} function", op.function.name, op.task))?;

    if workload.arity != op.function.args.len() {
        bail!(
            "`{}` takes {} argument(s), {} given",
            workload.name,
            workload.arity,
            op.function.args.len()
        );
    }

    let start = match (op.task, &op.start) {
        (Task::Reduce, Some(start)) => start.clone(),
        (Task::Reduce, None) => bail!("reduce `{}` has no start value", workload.name),
        (_, Some(_)) => bail!("{} `{}` must not carry a start value", op.task, workload.name),
        (_, None) => Value::Null,
    };

    Ok(Step {
        kernel: workload.kernel,
        args: &op.function.args,
        start,
    })
}

/// Fetch argument `i`, which [`bind`] already checked exists.
pub(crate) fn arg(args: &[Value], i: usize) -> Result<&Value> {
    args.get(i)
        .ok_or_else(|| anyhow!("missing argument {i}"))
}
