//! Worker loop: wait for a directive, execute, report, repeat.

use std::sync::Arc;

use serde::Serialize;
use taskfarm_core::{Branching, Task, Workload};
use taskfarm_wire::{Directive, Report, WorkerChannel, WorkerId, WorkerLink};
use tracing::{debug, info, warn};

use crate::error::FarmError;

/// What one worker did over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    pub worker: u32,
    pub executed: u64,
    pub failed: u64,
    pub children_emitted: u64,
}

pub struct WorkerLoop<L> {
    channel: WorkerChannel<L>,
    workload: Arc<dyn Workload>,
    branching: Box<dyn Branching>,
    capacity: u32,
    summary: WorkerSummary,
}

impl<L: WorkerLink> WorkerLoop<L> {
    pub fn new(
        channel: WorkerChannel<L>,
        workload: Arc<dyn Workload>,
        branching: Box<dyn Branching>,
        capacity: u32,
    ) -> Self {
        let summary = WorkerSummary {
            worker: channel.id().0,
            ..WorkerSummary::default()
        };
        Self {
            channel,
            workload,
            branching,
            capacity,
            summary,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.channel.id()
    }

    /// Serve assignments until the coordinator says to terminate.
    ///
    /// Every assignment is answered with exactly one report, even when the
    /// task fails or emits no children.
    pub async fn run(mut self) -> Result<WorkerSummary, FarmError> {
        let worker = self.id();
        info!(worker = %worker, "worker ready");
        loop {
            match self.channel.next_directive().await? {
                Directive::Terminate => break,
                Directive::Assignment(task) => {
                    let report = self.execute(task).await?;
                    self.channel.report(&report).await?;
                }
            }
        }
        info!(
            worker = %worker,
            executed = self.summary.executed,
            failed = self.summary.failed,
            "worker terminated"
        );
        Ok(self.summary)
    }

    async fn execute(&mut self, task: Task) -> Result<Report, FarmError> {
        let worker = self.id();
        let workload = Arc::clone(&self.workload);
        let job = task.clone();
        let executed = tokio::task::spawn_blocking(move || workload.execute(&job)).await;
        self.summary.executed += 1;

        let result = match executed {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(worker = %worker, depth = task.depth, error = %e, "task failed");
                self.summary.failed += 1;
                return Ok(Report::failed(&task, e.to_string()));
            }
            Err(e) if e.is_panic() => {
                warn!(worker = %worker, depth = task.depth, "workload panicked");
                self.summary.failed += 1;
                return Ok(Report::failed(&task, "workload panicked"));
            }
            Err(e) => return Err(FarmError::Join(e)),
        };

        let count = self.branching.children(&task);
        if count > self.capacity {
            return Err(FarmError::Config(format!(
                "task emitted {count} children, frame capacity is {}",
                self.capacity
            )));
        }
        let children = task.expand(count);
        self.summary.children_emitted += children.len() as u64;
        debug!(worker = %worker, depth = task.depth, children = children.len(), "executed");
        Ok(Report::completed(&task, result, children))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskfarm_core::config::TreeConfig;
    use taskfarm_core::{DigestBranching, DigestWorkload, Outcome, TaskError, TaskResult};
    use taskfarm_wire::{cluster, FrameCodec};

    struct Refuse;

    impl Workload for Refuse {
        fn execute(&self, task: &Task) -> Result<TaskResult, TaskError> {
            Err(TaskError::Failed {
                depth: task.depth,
                reason: "refused".into(),
            })
        }
    }

    struct Always(u32);

    impl Branching for Always {
        fn children(&mut self, task: &Task) -> u32 {
            if task.is_terminal() {
                0
            } else {
                self.0
            }
        }
    }

    fn root(depth: u32) -> Task {
        Task::seeds(&TreeConfig {
            depth,
            ..TreeConfig::default()
        })
        .unwrap()
        .remove(0)
    }

    async fn round_trip(
        workload: Arc<dyn Workload>,
        branching: Box<dyn Branching>,
        capacity: u32,
        task: Task,
    ) -> (Result<WorkerSummary, FarmError>, Option<Report>) {
        let (mut coord, mut ends) = cluster(1, FrameCodec::for_batch(capacity));
        let worker = WorkerLoop::new(ends.remove(0), workload, branching, capacity);
        let running = tokio::spawn(worker.run());

        let handle = coord.recv_async(WorkerId(0)).unwrap();
        coord
            .send_async(WorkerId(0), &Directive::Assignment(task))
            .unwrap();
        let report = match coord.wait_some(&[handle]).await {
            Ok(done) => Some(coord.codec().decode::<Report>(&done[0].frame).unwrap()),
            Err(_) => None,
        };
        let _ = coord.send_async(WorkerId(0), &Directive::Terminate);
        drop(coord);
        (running.await.unwrap(), report)
    }

    #[tokio::test]
    async fn completed_task_reports_its_children() {
        let (summary, report) =
            round_trip(Arc::new(DigestWorkload::default()), Box::new(Always(3)), 4, root(2)).await;
        let report = report.unwrap();
        assert_eq!(report.count, 3);
        assert!(report.children.iter().all(|c| c.depth == 1));
        let summary = summary.unwrap();
        assert_eq!(summary.executed, 1);
        assert_eq!(summary.children_emitted, 3);
    }

    #[tokio::test]
    async fn leaf_still_reports() {
        let (_, report) =
            round_trip(Arc::new(DigestWorkload::default()), Box::new(DigestBranching), 4, root(0)).await;
        let report = report.unwrap();
        assert_eq!(report.count, 0);
        assert!(matches!(report.outcome, Outcome::Completed(_)));
    }

    #[tokio::test]
    async fn failed_task_reports_failure_without_children() {
        let (summary, report) = round_trip(Arc::new(Refuse), Box::new(Always(2)), 4, root(3)).await;
        let report = report.unwrap();
        assert_eq!(report.count, 0);
        assert!(matches!(report.outcome, Outcome::Failed { .. }));
        assert_eq!(summary.unwrap().failed, 1);
    }

    #[tokio::test]
    async fn oversized_batch_stops_the_worker() {
        let (summary, report) =
            round_trip(Arc::new(DigestWorkload::default()), Box::new(Always(5)), 2, root(2)).await;
        assert!(report.is_none());
        assert!(matches!(summary, Err(FarmError::Config(_))));
    }
}
