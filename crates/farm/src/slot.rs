use taskfarm_core::Digest;
use taskfarm_wire::RecvHandle;

/// Coordinator-side record of one worker.
///
/// A busy slot (`available == false`) always has a pending receive: the one
/// its report will complete, and the payload that report must answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSlot {
    pub available: bool,
    pub pending_receive: Option<RecvHandle>,
    pub assigned: Option<Digest>,
}

impl Default for WorkerSlot {
    fn default() -> Self {
        Self {
            available: true,
            pending_receive: None,
            assigned: None,
        }
    }
}

impl WorkerSlot {
    pub fn is_busy(&self) -> bool {
        !self.available
    }

    /// The handle to await for this slot, if it is busy.
    pub fn awaited(&self) -> Option<RecvHandle> {
        if self.is_busy() {
            self.pending_receive
        } else {
            None
        }
    }
}
