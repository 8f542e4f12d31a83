//! Running a pipeline over one partition, and merging partition results.

use anyhow::{bail, Result};
use serde_json::Value;
use tracing::debug;

use common::{Operation, ShardOutput, Task};

use crate::{bind, Kernel};

/// Apply `operations` in order to `data`, a partition whose first element
/// sits at `offset` in the job's dataset.
///
/// Filters see each element's position in the job's dataset, not in the
/// partition, so a predicate on the index gives the same answer however the
/// data was split. A reduce, which may only be the last step, folds what is
/// left from its seed.
pub fn execute(operations: &[Operation], data: Vec<Value>, offset: usize) -> Result<ShardOutput> {
    let steps = operations.iter().map(bind).collect::<Result<Vec<_>>>()?;
    debug!(
        "Running {} step(s) over {} element(s) at offset {offset}",
        steps.len(),
        data.len()
    );

    let mut elements: Vec<(usize, Value)> = data
        .into_iter()
        .enumerate()
        .map(|(i, value)| (offset + i, value))
        .collect();

    for (position, step) in steps.iter().enumerate() {
        match step.kernel {
            Kernel::Map(f) => {
                elements = elements
                    .into_iter()
                    .map(|(index, value)| Ok((index, f(&value, step.args)?)))
                    .collect::<Result<_>>()?;
            }
            Kernel::Filter(f) => {
                let mut kept = Vec::with_capacity(elements.len());
                for (index, value) in elements {
                    if f(&value, index, step.args)? {
                        kept.push((index, value));
                    }
                }
                elements = kept;
            }
            Kernel::Reduce(f) => {
                if position + 1 != steps.len() {
                    bail!("reduce must be the last operation of a pipeline");
                }
                let reduced = elements
                    .iter()
                    .try_fold(step.start.clone(), |acc, (_, value)| f(acc, value, step.args))?;
                return Ok(ShardOutput::Reduced(reduced));
            }
        }
    }

    Ok(ShardOutput::Elements(
        elements.into_iter().map(|(_, value)| value).collect(),
    ))
}

/// Combine shard outputs, given in shard order, into the job's result.
///
/// Element lists are concatenated. Reduced values are folded left to right
/// with the trailing reduce's function, starting again from its seed.
pub fn merge(operations: &[Operation], partials: Vec<ShardOutput>) -> Result<Value> {
    match operations.last() {
        Some(last) if last.task == Task::Reduce => {
            let step = bind(last)?;
            let Kernel::Reduce(f) = step.kernel else {
                bail!("`{}` is not a reduce function", last.function.name);
            };

            partials
                .into_iter()
                .try_fold(step.start.clone(), |acc, partial| match partial {
                    ShardOutput::Reduced(value) => f(acc, &value, step.args),
                    ShardOutput::Elements(_) => bail!("expected a reduced shard, got elements"),
                })
        }
        _ => {
            let mut merged = Vec::new();
            for partial in partials {
                match partial {
                    ShardOutput::Elements(values) => merged.extend(values),
                    ShardOutput::Reduced(_) => bail!("expected shard elements, got a reduced value"),
                }
            }
            Ok(Value::Array(merged))
        }
    }
}

/// Run the whole pipeline in-process over the whole dataset.
pub fn reference(operations: &[Operation], data: Vec<Value>) -> Result<Value> {
    Ok(match execute(operations, data, 0)? {
        ShardOutput::Elements(values) => Value::Array(values),
        ShardOutput::Reduced(value) => value,
    })
}
