use async_trait::async_trait;

use crate::channel::SendHandle;
use crate::error::WireError;
use crate::protocol::WorkerId;

/// Coordinator-side outbound half of a link.
///
/// `transmit` only enqueues: it never waits for the peer. The returned
/// [`SendHandle`] completes once the link has flushed the frame.
pub trait Transmitter: Send + Sync {
    fn transmit(
        &self,
        dest: WorkerId,
        topic: &'static str,
        frame: Vec<u8>,
    ) -> Result<SendHandle, WireError>;
}

/// Worker-side link to the coordinator.
///
/// A worker is strictly sequential (wait, execute, report), so the link is
/// driven through `&mut self` and needs no background task.
#[async_trait]
pub trait WorkerLink: Send {
    /// Receive the next frame from the coordinator, with the topic it was
    /// sent under. Blocks until available.
    async fn recv(&mut self) -> Result<(&'static str, Vec<u8>), WireError>;

    /// Send one frame to the coordinator.
    async fn send(&mut self, topic: &'static str, frame: Vec<u8>) -> Result<(), WireError>;
}
