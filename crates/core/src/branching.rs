//! Branching rules: how many children an executed task emits.
//!
//! The decision is kept apart from the workload so that the randomness source
//! can be swapped (and seeded) without touching task execution.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::task::Task;

/// Index reserved for branching draws; children use `0..count`.
const BRANCH_SALT: u32 = u32::MAX;

/// Decides the child count for an executed task.
///
/// Implementations must return 0 for terminal tasks and otherwise either 0
/// (leaf) or a count within the task's [`BranchRange`](crate::task::BranchRange).
pub trait Branching: Send {
    fn children(&mut self, task: &Task) -> u32;
}

/// Draws derived from the task payload alone.
///
/// The same task always branches the same way, whichever worker runs it and
/// in whatever order. This is the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestBranching;

impl Branching for DigestBranching {
    fn children(&mut self, task: &Task) -> u32 {
        if task.is_terminal() {
            return 0;
        }
        let draw = task.payload.derive(BRANCH_SALT);
        let coin = unit_interval(draw.prefix_u64());
        if coin >= task.branch_probability {
            return 0;
        }
        let pick = draw.derive(0).prefix_u64() % task.branch.width();
        task.branch.min + pick as u32
    }
}

/// Draws from a seeded RNG stream.
///
/// Reproducible only when tasks are executed in a fixed order, e.g. a single
/// worker fed FIFO.
#[derive(Debug, Clone)]
pub struct SeededBranching {
    rng: StdRng,
}

impl SeededBranching {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Branching for SeededBranching {
    fn children(&mut self, task: &Task) -> u32 {
        if task.is_terminal() {
            return 0;
        }
        let coin: f64 = self.rng.gen();
        if coin >= task.branch_probability {
            return 0;
        }
        self.rng.gen_range(task.branch.min..=task.branch.max)
    }
}

/// Which branching rule workers use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BranchingKind {
    #[default]
    Digest,
    Seeded {
        seed: u64,
    },
}

impl BranchingKind {
    /// Build the branching rule for one worker. Seeded streams are offset by
    /// the worker index so workers don't replay each other's draws.
    pub fn build(&self, worker_index: u32) -> Box<dyn Branching> {
        match *self {
            Self::Digest => Box::new(DigestBranching),
            Self::Seeded { seed } => {
                Box::new(SeededBranching::new(seed.wrapping_add(u64::from(worker_index))))
            }
        }
    }
}

/// Map 64 random bits onto `[0, 1)` using the top 53.
fn unit_interval(bits: u64) -> f64 {
    (bits >> 11) as f64 / (1u64 << 53) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;

    fn seeds(n: u32, depth: u32, min: u32, max: u32, p: f64) -> Vec<Task> {
        Task::seeds(&TreeConfig {
            seeds: n,
            depth,
            min_children: min,
            max_children: max,
            branch_probability: p,
            instance: "branching".into(),
        })
        .unwrap()
    }

    #[test]
    fn certain_branching_stays_in_range() {
        let mut rule = DigestBranching;
        for task in seeds(64, 3, 2, 5, 1.0) {
            let n = rule.children(&task);
            assert!((2..=5).contains(&n), "got {n}");
        }
    }

    #[test]
    fn unbounded_range_draws_without_overflow() {
        let mut rule = DigestBranching;
        for task in seeds(16, 1, 0, u32::MAX, 1.0) {
            rule.children(&task);
        }
    }

    #[test]
    fn zero_probability_never_branches() {
        let mut digest = DigestBranching;
        let mut seeded = SeededBranching::new(7);
        for task in seeds(32, 4, 1, 3, 0.0) {
            assert_eq!(digest.children(&task), 0);
            assert_eq!(seeded.children(&task), 0);
        }
    }

    #[test]
    fn terminal_tasks_are_leaves() {
        let mut digest = DigestBranching;
        let mut seeded = SeededBranching::new(1);
        for task in seeds(8, 0, 2, 2, 1.0) {
            assert_eq!(digest.children(&task), 0);
            assert_eq!(seeded.children(&task), 0);
        }
    }

    #[test]
    fn digest_branching_is_a_function_of_the_task() {
        let tasks = seeds(16, 2, 0, 4, 0.5);
        let first: Vec<u32> = tasks.iter().map(|t| DigestBranching.children(t)).collect();
        let again: Vec<u32> = tasks.iter().rev().map(|t| DigestBranching.children(t)).collect();
        assert_eq!(first, again.into_iter().rev().collect::<Vec<_>>());
    }

    #[test]
    fn digest_branching_respects_probability_roughly() {
        let tasks = seeds(2000, 1, 1, 1, 0.25);
        let branched = tasks.iter().filter(|t| DigestBranching.children(t) > 0).count();
        assert!((350..650).contains(&branched), "branched {branched} of 2000");
    }

    #[test]
    fn seeded_streams_replay() {
        let tasks = seeds(32, 2, 1, 4, 0.6);
        let mut a = SeededBranching::new(42);
        let mut b = SeededBranching::new(42);
        let xs: Vec<u32> = tasks.iter().map(|t| a.children(t)).collect();
        let ys: Vec<u32> = tasks.iter().map(|t| b.children(t)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn kind_parses_from_toml() {
        #[derive(Deserialize)]
        struct Wrap {
            branching: BranchingKind,
        }
        let w: Wrap = toml::from_str("[branching]\nmode = \"seeded\"\nseed = 9\n").unwrap();
        assert_eq!(w.branching, BranchingKind::Seeded { seed: 9 });
        let w: Wrap = toml::from_str("[branching]\nmode = \"digest\"\n").unwrap();
        assert_eq!(w.branching, BranchingKind::Digest);
    }
}
