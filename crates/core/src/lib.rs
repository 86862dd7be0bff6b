//! Core types of the task farm: tasks, branching rules, the payload
//! workload, result aggregation, and configuration.

pub mod aggregate;
pub mod branching;
pub mod config;
pub mod error;
pub mod task;
pub mod workload;

pub use aggregate::{Aggregator, Collect, Outcome, Summary, Tally};
pub use branching::{Branching, BranchingKind, DigestBranching, SeededBranching};
pub use config::FarmConfig;
pub use error::{CoreError, TaskError};
pub use task::{BranchRange, Digest, Task};
pub use workload::{DigestWorkload, TaskResult, Workload};
