//! Topic frames for the ZeroMQ framing.
//!
//! Topics follow the pattern `taskfarm.<sender>.<event>`. Over ZeroMQ they let
//! the link route frames without decoding. Both links hand the topic to the
//! worker, which checks it against the decoded directive.

/// Worker announces its rank to the coordinator (payload: `u32` LE).
pub const HELLO: &str = "taskfarm.worker.hello";

/// Worker reports a result and its child tasks.
pub const REPORT: &str = "taskfarm.worker.report";

/// Coordinator assigns one task.
pub const ASSIGN: &str = "taskfarm.coordinator.assign";

/// Coordinator tells every worker to exit.
pub const TERMINATE: &str = "taskfarm.coordinator.terminate";
