use thiserror::Error;

/// Errors raised while building or validating farm configuration.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("invalid branch range: min {min} > max {max}")]
    BranchRange { min: u32, max: u32 },
}

/// A task's payload computation failed.
///
/// Worker-local: the worker reports it in place of a result and the
/// coordinator counts the slot as done without retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task at depth {depth} failed: {reason}")]
    Failed { depth: u32, reason: String },
}
