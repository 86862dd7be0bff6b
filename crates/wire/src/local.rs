//! In-process link over tokio channels.
//!
//! Coordinator and workers run as tasks of one process, but still exchange
//! encoded fixed-size frames so they follow exactly the same protocol as the
//! ZeroMQ link.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::channel::{CoordinatorChannel, Inbound, SendHandle, WorkerChannel};
use crate::error::WireError;
use crate::frame::FrameCodec;
use crate::protocol::WorkerId;
use crate::traits::{Transmitter, WorkerLink};

/// Build a coordinator channel and `workers` worker channels wired to it.
pub fn cluster(
    workers: u32,
    codec: FrameCodec,
) -> (CoordinatorChannel, Vec<WorkerChannel<LocalWorkerLink>>) {
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel::<Inbound>();
    let mut outboxes = HashMap::new();
    let mut ends = Vec::with_capacity(workers as usize);

    for rank in 0..workers {
        let id = WorkerId(rank);
        let (tx, rx) = mpsc::unbounded_channel();
        outboxes.insert(id, tx);
        let link = LocalWorkerLink {
            id,
            rx,
            inbox: inbox_tx.clone(),
        };
        ends.push(WorkerChannel::new(id, codec, link));
    }

    let coordinator = CoordinatorChannel::new(
        codec,
        Box::new(LocalTransmitter { outboxes }),
        inbox_rx,
        (0..workers).map(WorkerId),
    );
    (coordinator, ends)
}

struct LocalTransmitter {
    outboxes: HashMap<WorkerId, mpsc::UnboundedSender<(&'static str, Vec<u8>)>>,
}

impl Transmitter for LocalTransmitter {
    fn transmit(
        &self,
        dest: WorkerId,
        topic: &'static str,
        frame: Vec<u8>,
    ) -> Result<SendHandle, WireError> {
        let outbox = self
            .outboxes
            .get(&dest)
            .ok_or_else(|| WireError::ProtocolViolation(format!("unknown worker {dest}")))?;
        outbox
            .send((topic, frame))
            .map_err(|_| WireError::Transport(format!("worker {dest} hung up")))?;
        Ok(SendHandle::completed())
    }
}

/// Worker end of an in-process link.
pub struct LocalWorkerLink {
    id: WorkerId,
    rx: mpsc::UnboundedReceiver<(&'static str, Vec<u8>)>,
    inbox: mpsc::UnboundedSender<Inbound>,
}

#[async_trait]
impl WorkerLink for LocalWorkerLink {
    async fn recv(&mut self) -> Result<(&'static str, Vec<u8>), WireError> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| WireError::Transport("coordinator hung up".into()))
    }

    async fn send(&mut self, _topic: &'static str, frame: Vec<u8>) -> Result<(), WireError> {
        self.inbox
            .send(Ok((self.id, frame)))
            .map_err(|_| WireError::Transport("coordinator hung up".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Directive, Report};
    use taskfarm_core::{Task, TaskResult};

    fn leaf() -> TaskResult {
        TaskResult { depth: 0, checksum: 1 }
    }

    #[tokio::test]
    async fn directive_reaches_the_addressed_worker() {
        let (coord, mut ends) = cluster(2, FrameCodec::for_batch(2));
        let task = Task::seeds(&Default::default()).unwrap().remove(0);
        coord
            .send_async(WorkerId(1), &Directive::Assignment(task.clone()))
            .unwrap()
            .wait()
            .await
            .unwrap();
        let got = ends[1].next_directive().await.unwrap();
        assert_eq!(got, Directive::Assignment(task));
    }

    #[tokio::test]
    async fn report_completes_posted_receive() {
        let (mut coord, mut ends) = cluster(1, FrameCodec::for_batch(2));
        let handle = coord.recv_async(WorkerId(0)).unwrap();
        let task = Task::seeds(&Default::default()).unwrap().remove(0);
        ends[0].report(&Report::completed(&task, leaf(), vec![])).await.unwrap();

        let done = coord.wait_some(&[handle]).await.unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].source, WorkerId(0));
        let report: Report = coord.codec().decode(&done[0].frame).unwrap();
        assert_eq!(report.count, 0);
        assert_eq!(coord.posted_len(), 0);
    }

    #[tokio::test]
    async fn hung_up_worker_surfaces_as_transport_error() {
        let (coord, ends) = cluster(1, FrameCodec::for_batch(1));
        drop(ends);
        let err = coord
            .send_async(WorkerId(0), &Directive::Terminate)
            .unwrap_err();
        assert!(matches!(err, WireError::Transport(_)), "got {err}");
    }
}
