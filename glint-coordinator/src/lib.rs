//! The Glint coordinator: keeps the worker registry, accepts jobs from
//! clients, splits them across workers and merges the results.

pub mod core;
pub mod dispatch;
pub mod executor;
pub mod jobs;
pub mod partition;
pub mod worker_info;
pub mod worker_registry;

pub use crate::core::{Coordinator, CoordinatorConfig, DEFAULT_PORT};
pub use executor::{Executor, ExecutorError};
pub use jobs::{Job, JobInFlight, JobRecord};
