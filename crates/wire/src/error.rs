use thiserror::Error;

/// Errors that can occur in the taskfarm messaging layer.
///
/// Every variant is fatal to a run: there is no partial-result recovery.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("zeromq error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("message body of {len} bytes exceeds frame capacity of {capacity} bytes")]
    Oversize { len: usize, capacity: usize },

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}
