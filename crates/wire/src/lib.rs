//! Messaging layer between the coordinator and its workers.
//!
//! Every message is a fixed-size frame ([`frame`]). The coordinator talks to
//! all workers through one [`CoordinatorChannel`] with non-blocking sends and
//! posted receives; each worker holds a [`WorkerChannel`]. Two links back the
//! channels: in-process tokio queues ([`local`]) and ZeroMQ ROUTER/DEALER
//! sockets ([`zmq`]).

pub mod channel;
pub mod error;
pub mod frame;
pub mod local;
pub mod protocol;
pub mod topics;
pub mod traits;
pub mod transport;
pub mod zmq;

pub use channel::{Completion, CoordinatorChannel, Inbound, RecvHandle, SendHandle, WorkerChannel};
pub use error::WireError;
pub use frame::FrameCodec;
pub use local::{cluster, LocalWorkerLink};
pub use protocol::{Directive, Report, WorkerId};
pub use traits::{Transmitter, WorkerLink};
pub use transport::Transport;
pub use zmq::{ZmqCoordinatorLink, ZmqWorkerLink};
