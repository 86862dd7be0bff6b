use std::collections::BTreeMap;

use serde::Serialize;
use taskfarm_core::Outcome;
use taskfarm_wire::{Report, WorkerId};

/// Scheduler counters, reported alongside the run result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Assignments sent.
    pub dispatched: u64,
    /// Reports ingested.
    pub reports: u64,
    /// Reports whose task failed.
    pub failures: u64,
    /// Child tasks appended to the queue.
    pub children: u64,
    /// Largest queue length seen after seeding or ingest.
    pub max_queue_depth: usize,
    /// Calls to `wait_some`.
    pub wait_calls: u64,
    /// `wait_some` calls that returned no completion.
    pub empty_waits: u64,
    /// Largest number of completions a single wait returned.
    pub max_completions_per_wait: usize,
    /// Assignments per worker rank.
    pub dispatched_by_worker: BTreeMap<u32, u64>,
}

impl SchedulerStats {
    pub fn record_dispatch(&mut self, worker: WorkerId) {
        self.dispatched += 1;
        *self.dispatched_by_worker.entry(worker.0).or_default() += 1;
    }

    pub fn record_report(&mut self, report: &Report) {
        self.reports += 1;
        self.children += u64::from(report.count);
        if matches!(report.outcome, Outcome::Failed { .. }) {
            self.failures += 1;
        }
    }

    pub fn record_wait(&mut self, completions: usize) {
        self.wait_calls += 1;
        if completions == 0 {
            self.empty_waits += 1;
        }
        self.max_completions_per_wait = self.max_completions_per_wait.max(completions);
    }

    pub fn observe_queue(&mut self, len: usize) {
        self.max_queue_depth = self.max_queue_depth.max(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskfarm_core::{Task, TaskResult};

    #[test]
    fn reports_and_failures_are_counted() {
        let mut s = SchedulerStats::default();
        let task = Task::seeds(&Default::default()).unwrap().remove(0);
        s.record_report(&Report::completed(&task, TaskResult { depth: 1, checksum: 0 }, Vec::new()));
        s.record_report(&Report::failed(&task, "nope"));
        assert_eq!(s.reports, 2);
        assert_eq!(s.failures, 1);
        assert_eq!(s.children, 0);
    }

    #[test]
    fn dispatches_are_tracked_per_worker() {
        let mut s = SchedulerStats::default();
        s.record_dispatch(WorkerId(0));
        s.record_dispatch(WorkerId(2));
        s.record_dispatch(WorkerId(0));
        assert_eq!(s.dispatched, 3);
        assert_eq!(s.dispatched_by_worker[&0], 2);
        assert_eq!(s.dispatched_by_worker[&2], 1);
    }

    #[test]
    fn waits_track_empties_and_peaks() {
        let mut s = SchedulerStats::default();
        s.record_wait(0);
        s.record_wait(3);
        s.record_wait(1);
        assert_eq!(s.wait_calls, 3);
        assert_eq!(s.empty_waits, 1);
        assert_eq!(s.max_completions_per_wait, 3);
    }
}
