//! Deciding how a job's dataset is split across workers.
//!
//! Sizes are bytes of compact JSON. A slice of `n` elements serializes to the
//! elements' own bytes, `n - 1` commas and two brackets, so the size of any
//! slice is known from per-element sizes without serializing it again.
//!
//! The plan:
//! 1. No workers at all is [`PlanError::NoCapacity`], whatever the data.
//! 2. The first worker, in registration order, whose `max_mem` covers the
//!    whole dataset gets all of it as one shard.
//! 3. Otherwise the dataset is cut into contiguous shards, each on a
//!    different worker, using as few shards as possible. If any split exists
//!    one is found.
//! 4. If no split exists (an element bigger than every worker, or not enough
//!    workers), the result is [`PlanError::NoCapacity`].
//!
//! A split into `k` shards exists iff one exists on the `k` largest workers,
//! since a bigger worker holds whatever a smaller one held. The search runs
//! over subsets of the [`EXACT_SEARCH_WORKERS`] largest workers, tracking for
//! each subset the furthest element it can cover. A subset that has reached
//! further is never worse off, so one position per subset is enough. Jobs that
//! need more shards than that fall back to a largest-first greedy split.

use std::ops::Range;

use serde_json::Value;
use thiserror::Error;

use common::WorkerID;

use crate::worker_info::WorkerCapacity;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("no worker capacity for a job of {size} bytes ({workers} worker(s) registered)")]
    NoCapacity { size: u64, workers: usize },
}

/// One shard of a plan: which worker gets which elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub worker: WorkerID,
    pub range: Range<usize>,
}

pub fn element_sizes(data: &[Value]) -> Vec<u64> {
    data.iter()
        .map(|value| serde_json::to_string(value).map_or(0, |s| s.len() as u64))
        .collect()
}

/// Bytes of the compact JSON array holding elements of the given sizes.
pub fn slice_size(sizes: &[u64]) -> u64 {
    2 + sizes.iter().sum::<u64>() + sizes.len().saturating_sub(1) as u64
}

/// Number of largest workers the exact split search considers.
pub const EXACT_SEARCH_WORKERS: usize = 16;

/// Split elements of the given sizes across `workers`, which must be in
/// registration order. Assignments come back in dataset order.
pub fn plan(sizes: &[u64], workers: &[WorkerCapacity]) -> Result<Vec<Assignment>, PlanError> {
    let total = slice_size(sizes);
    let no_capacity = || PlanError::NoCapacity {
        size: total,
        workers: workers.len(),
    };

    if workers.is_empty() {
        return Err(no_capacity());
    }

    if let Some(worker) = workers.iter().find(|w| w.max_mem >= total) {
        return Ok(vec![Assignment {
            worker: worker.id,
            range: 0..sizes.len(),
        }]);
    }

    let mut ranked = workers.to_vec();
    // Stable, so equal capacities keep registration order.
    ranked.sort_by(|a, b| b.max_mem.cmp(&a.max_mem));

    let searched = ranked.len().min(EXACT_SEARCH_WORKERS);
    fewest_shards(sizes, &ranked[..searched])
        .or_else(|| largest_first(sizes, &ranked))
        .ok_or_else(no_capacity)
}

/// The split with the fewest shards over `ranked`, if there is one.
fn fewest_shards(sizes: &[u64], ranked: &[WorkerCapacity]) -> Option<Vec<Assignment>> {
    let subsets = 1usize << ranked.len();

    // Furthest element covered by each subset of workers, and the step that
    // got there: the smaller subset and the worker added to it.
    let mut reach: Vec<Option<usize>> = vec![None; subsets];
    let mut via = vec![(0usize, 0usize); subsets];
    reach[0] = Some(0);

    let mut best: Option<usize> = None;

    // Every subset is numerically larger than the subsets it grows from, so
    // those are final by the time it is visited.
    for subset in 0..subsets {
        let Some(cursor) = reach[subset] else {
            continue;
        };

        if cursor == sizes.len() {
            if subset != 0 && best.map_or(true, |b| subset.count_ones() < b.count_ones()) {
                best = Some(subset);
            }
            continue;
        }

        for (i, worker) in ranked.iter().enumerate() {
            let bit = 1 << i;
            if subset & bit != 0 {
                continue;
            }

            let end = longest_fit(sizes, cursor, worker.max_mem);
            if end == cursor {
                continue;
            }

            let next = subset | bit;
            if reach[next].map_or(true, |r| end > r) {
                reach[next] = Some(end);
                via[next] = (subset, i);
            }
        }
    }

    let mut subset = best?;
    let mut assignments = Vec::new();
    while subset != 0 {
        let (previous, i) = via[subset];
        assignments.push(Assignment {
            worker: ranked[i].id,
            range: reach[previous]?..reach[subset]?,
        });
        subset = previous;
    }
    assignments.reverse();
    Some(assignments)
}

/// Each worker, largest first, takes the longest run it can.
fn largest_first(sizes: &[u64], ranked: &[WorkerCapacity]) -> Option<Vec<Assignment>> {
    let mut assignments = Vec::new();
    let mut cursor = 0;

    for worker in ranked {
        if cursor == sizes.len() {
            break;
        }

        let end = longest_fit(sizes, cursor, worker.max_mem);
        if end == cursor {
            // Workers only get smaller from here.
            return None;
        }

        assignments.push(Assignment {
            worker: worker.id,
            range: cursor..end,
        });
        cursor = end;
    }

    (cursor == sizes.len() && !assignments.is_empty()).then_some(assignments)
}

/// Largest `end` such that `sizes[start..end]` fits in `budget` bytes.
fn longest_fit(sizes: &[u64], start: usize, budget: u64) -> usize {
    let mut used = 2;
    let mut end = start;

    for &size in &sizes[start..] {
        let separator = u64::from(end > start);
        if used + size + separator > budget {
            break;
        }
        used += size + separator;
        end += 1;
    }

    end
}
