//! Result aggregation on the coordinator.
//!
//! Results arrive in whatever order workers finish, so every aggregator must
//! combine associatively and without regard to order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::workload::TaskResult;

/// What a worker reported for one executed task.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed(TaskResult),
    Failed { reason: String },
}

pub trait Aggregator {
    type Output;

    fn ingest(&mut self, outcome: &Outcome);

    /// Consume the aggregator once the run has terminated.
    fn finalize(self) -> Self::Output;
}

/// Final figures of a [`Tally`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Reports ingested, successful or not.
    pub executed: u64,
    pub completed: u64,
    pub failed: u64,
    /// Wrapping sum of result checksums.
    pub checksum: u64,
    /// Completed results per task depth.
    pub by_depth: BTreeMap<u32, u64>,
}

/// Counts and checksums every outcome.
#[derive(Debug, Default)]
pub struct Tally {
    summary: Summary,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Aggregator for Tally {
    type Output = Summary;

    fn ingest(&mut self, outcome: &Outcome) {
        let s = &mut self.summary;
        s.executed += 1;
        match outcome {
            Outcome::Completed(result) => {
                s.completed += 1;
                s.checksum = s.checksum.wrapping_add(result.checksum);
                *s.by_depth.entry(result.depth).or_default() += 1;
            }
            Outcome::Failed { .. } => s.failed += 1,
        }
    }

    fn finalize(self) -> Summary {
        self.summary
    }
}

/// Keeps every outcome; finalizes to a canonically sorted multiset.
#[derive(Debug, Default)]
pub struct Collect {
    outcomes: Vec<Outcome>,
}

impl Collect {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Aggregator for Collect {
    type Output = Vec<Outcome>;

    fn ingest(&mut self, outcome: &Outcome) {
        self.outcomes.push(outcome.clone());
    }

    fn finalize(mut self) -> Vec<Outcome> {
        self.outcomes.sort();
        self.outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn done(depth: u32, checksum: u64) -> Outcome {
        Outcome::Completed(TaskResult { depth, checksum })
    }

    #[test]
    fn tally_counts_and_sums() {
        let mut t = Tally::new();
        t.ingest(&done(1, 10));
        t.ingest(&done(0, u64::MAX));
        t.ingest(&Outcome::Failed { reason: "boom".into() });
        let s = t.finalize();
        assert_eq!(s.executed, 3);
        assert_eq!(s.completed, 2);
        assert_eq!(s.failed, 1);
        assert_eq!(s.checksum, 9);
        assert_eq!(s.by_depth[&0], 1);
        assert_eq!(s.by_depth[&1], 1);
    }

    #[test]
    fn tally_ignores_arrival_order() {
        let outcomes = [done(2, 5), done(1, 7), done(1, 11), done(0, 3)];
        let mut forward = Tally::new();
        outcomes.iter().for_each(|o| forward.ingest(o));
        let mut backward = Tally::new();
        outcomes.iter().rev().for_each(|o| backward.ingest(o));
        assert_eq!(forward.finalize(), backward.finalize());
    }

    #[test]
    fn collect_is_a_sorted_multiset() {
        let mut a = Collect::new();
        let mut b = Collect::new();
        for o in [done(0, 2), done(0, 1), done(0, 2)] {
            a.ingest(&o);
        }
        for o in [done(0, 2), done(0, 2), done(0, 1)] {
            b.ingest(&o);
        }
        let a = a.finalize();
        assert_eq!(a, b.finalize());
        assert_eq!(a.len(), 3);
    }
}
