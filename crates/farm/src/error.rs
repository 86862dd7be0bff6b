use taskfarm_core::CoreError;
use taskfarm_wire::WireError;
use thiserror::Error;

/// Errors that end a farm run.
///
/// Task failures are not errors here: workers report them as outcomes.
#[derive(Debug, Error)]
pub enum FarmError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
