//! Message types exchanged between coordinator and workers.

use std::fmt;

use serde::{Deserialize, Serialize};
use taskfarm_core::{Digest, Outcome, Task, TaskResult};

use crate::error::WireError;
use crate::topics;

/// Failure reasons longer than this are cut so the report still fits a frame.
pub const MAX_REASON_BYTES: usize = 160;

/// Rank of a worker process, `0..workers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub u32);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coordinator → worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directive {
    Assignment(Task),
    /// Sent once to every worker after the run has drained.
    Terminate,
}

impl Directive {
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Assignment(_) => topics::ASSIGN,
            Self::Terminate => topics::TERMINATE,
        }
    }
}

/// Worker → coordinator, sent after every assignment, even with no children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Payload of the assignment this report answers.
    pub answers: Digest,
    /// Explicit element count of `children`.
    pub count: u32,
    pub outcome: Outcome,
    pub children: Vec<Task>,
}

impl Report {
    pub fn completed(task: &Task, result: TaskResult, children: Vec<Task>) -> Self {
        Self {
            answers: task.payload,
            count: children.len() as u32,
            outcome: Outcome::Completed(result),
            children,
        }
    }

    /// A failure report. Failed tasks never carry children.
    pub fn failed(task: &Task, reason: impl Into<String>) -> Self {
        Self {
            answers: task.payload,
            count: 0,
            outcome: Outcome::Failed {
                reason: truncate_reason(reason.into()),
            },
            children: Vec::new(),
        }
    }

    /// Check the element count against the payload and the frame capacity.
    pub fn validate(&self, capacity: u32) -> Result<(), WireError> {
        if self.count as usize != self.children.len() {
            return Err(WireError::ProtocolViolation(format!(
                "report count {} does not match {} children",
                self.count,
                self.children.len()
            )));
        }
        if self.count > capacity {
            return Err(WireError::ProtocolViolation(format!(
                "report carries {} children, capacity is {capacity}",
                self.count
            )));
        }
        if matches!(self.outcome, Outcome::Failed { .. }) && self.count > 0 {
            return Err(WireError::ProtocolViolation(
                "failed report carries children".into(),
            ));
        }
        Ok(())
    }
}

fn truncate_reason(mut reason: String) -> String {
    if reason.len() > MAX_REASON_BYTES {
        let mut cut = MAX_REASON_BYTES;
        while !reason.is_char_boundary(cut) {
            cut -= 1;
        }
        reason.truncate(cut);
    }
    reason
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameCodec;
    use taskfarm_core::config::TreeConfig;

    fn tasks(n: u32) -> Vec<Task> {
        Task::seeds(&TreeConfig {
            seeds: n,
            depth: u32::MAX,
            ..TreeConfig::default()
        })
        .unwrap()
    }

    fn result() -> TaskResult {
        TaskResult {
            depth: u32::MAX,
            checksum: u64::MAX,
        }
    }

    #[test]
    fn full_report_fits_its_frame() {
        let codec = FrameCodec::for_batch(16);
        let report = Report::completed(&tasks(1)[0], result(), tasks(16));
        let frame = codec.encode(&report).unwrap();
        let back: Report = codec.decode(&frame).unwrap();
        assert_eq!(back, report);
        back.validate(16).unwrap();
    }

    #[test]
    fn assignment_fits_the_smallest_frame() {
        let codec = FrameCodec::for_batch(0);
        let directive = Directive::Assignment(tasks(1).remove(0));
        let frame = codec.encode(&directive).unwrap();
        assert_eq!(codec.decode::<Directive>(&frame).unwrap(), directive);
        assert_eq!(directive.topic(), topics::ASSIGN);
        assert_eq!(Directive::Terminate.topic(), topics::TERMINATE);
    }

    #[test]
    fn long_failure_reason_is_truncated_and_fits() {
        let codec = FrameCodec::for_batch(0);
        let report = Report::failed(&tasks(1)[0], "é".repeat(500));
        match &report.outcome {
            Outcome::Failed { reason } => assert!(reason.len() <= MAX_REASON_BYTES),
            other => panic!("unexpected outcome {other:?}"),
        }
        codec.encode(&report).unwrap();
    }

    #[test]
    fn count_mismatch_is_a_violation() {
        let mut report = Report::completed(&tasks(1)[0], result(), tasks(2));
        report.count = 3;
        assert!(matches!(
            report.validate(8),
            Err(WireError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn over_capacity_is_a_violation() {
        let report = Report::completed(&tasks(1)[0], result(), tasks(3));
        assert!(report.validate(3).is_ok());
        assert!(matches!(
            report.validate(2),
            Err(WireError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn failed_report_with_children_is_a_violation() {
        let mut report = Report::failed(&tasks(1)[0], "nope");
        report.children = tasks(1);
        report.count = 1;
        assert!(report.validate(4).is_err());
    }
}
