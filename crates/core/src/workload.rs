//! The payload computation a worker runs for each task.

use serde::{Deserialize, Serialize};

use crate::error::TaskError;
use crate::task::{Digest, Task};

/// Value produced by executing one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskResult {
    pub depth: u32,
    pub checksum: u64,
}

/// Opaque per-task computation.
///
/// Must be deterministic given the task and must not touch scheduler state.
pub trait Workload: Send + Sync {
    fn execute(&self, task: &Task) -> Result<TaskResult, TaskError>;
}

/// Re-hashes the payload `rounds` times.
///
/// `rounds` sets the compute granularity: how long a worker stays busy per
/// task relative to the messaging cost.
#[derive(Debug, Clone, Copy)]
pub struct DigestWorkload {
    pub rounds: u32,
}

impl Default for DigestWorkload {
    fn default() -> Self {
        Self { rounds: 1 }
    }
}

impl Workload for DigestWorkload {
    fn execute(&self, task: &Task) -> Result<TaskResult, TaskError> {
        let mut state: Digest = task.payload;
        for round in 0..self.rounds {
            state = state.derive(round);
        }
        Ok(TaskResult {
            depth: task.depth,
            checksum: state.prefix_u64(),
        })
    }
}
