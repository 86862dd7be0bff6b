//! Sequential reference executor.
//!
//! Runs the same task tree as the scheduler, in one thread, with no channel.
//! Any scheduler run over the same seeds must aggregate the same multiset of
//! outcomes.

use std::collections::VecDeque;

use taskfarm_core::{Aggregator, Branching, Outcome, Task, Workload};
use taskfarm_wire::Report;

/// Execute every task FIFO and aggregate the outcomes.
pub fn run_sequential<A: Aggregator>(
    seeds: impl IntoIterator<Item = Task>,
    workload: &dyn Workload,
    branching: &mut dyn Branching,
    mut aggregator: A,
) -> A::Output {
    let mut queue: VecDeque<Task> = seeds.into_iter().collect();
    while let Some(task) = queue.pop_front() {
        match workload.execute(&task) {
            Ok(result) => {
                let count = branching.children(&task);
                queue.extend(task.expand(count));
                aggregator.ingest(&Outcome::Completed(result));
            }
            // Failure reasons go through the same truncation as on the wire.
            Err(e) => aggregator.ingest(&Report::failed(&task, e.to_string()).outcome),
        }
    }
    aggregator.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskfarm_core::config::TreeConfig;
    use taskfarm_core::{DigestBranching, DigestWorkload, Tally};

    #[test]
    fn full_binary_tree_of_depth_two() {
        let seeds = Task::seeds(&TreeConfig {
            seeds: 1,
            depth: 2,
            min_children: 2,
            max_children: 2,
            branch_probability: 1.0,
            instance: "reference".into(),
        })
        .unwrap();
        let summary = run_sequential(seeds, &DigestWorkload::default(), &mut DigestBranching, Tally::new());
        assert_eq!(summary.executed, 7);
        assert_eq!(summary.by_depth[&2], 1);
        assert_eq!(summary.by_depth[&1], 2);
        assert_eq!(summary.by_depth[&0], 4);
    }

    #[test]
    fn no_seeds_no_results() {
        let summary = run_sequential(Vec::new(), &DigestWorkload::default(), &mut DigestBranching, Tally::new());
        assert_eq!(summary.executed, 0);
    }
}
