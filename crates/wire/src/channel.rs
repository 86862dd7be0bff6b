//! Asynchronous point-to-point channel between the coordinator and workers.
//!
//! The coordinator posts receives ahead of time ([`CoordinatorChannel::recv_async`])
//! and later waits on a set of them with [`CoordinatorChannel::wait_some`], which
//! returns as soon as at least one has completed, reporting every completed
//! handle at once. This lets the scheduler react to whichever worker finishes
//! first instead of polling workers in a fixed order.
//!
//! Links deliver inbound frames through a single fan-in queue of [`Inbound`]
//! items. Frames are buffered per source until a receive is posted for them,
//! so a worker that answers before its receive is posted loses nothing.

use std::collections::{HashMap, VecDeque};

use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::error::WireError;
use crate::frame::FrameCodec;
use crate::protocol::{Directive, Report, WorkerId};
use crate::topics;
use crate::traits::{Transmitter, WorkerLink};

/// One item on the coordinator's fan-in queue: a frame from a worker, or a
/// link failure.
pub type Inbound = Result<(WorkerId, Vec<u8>), WireError>;

// ── Handles ──────────────────────────────────────────────────────────

/// A posted, not yet consumed, receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecvHandle(u64);

enum SendState {
    Done(Result<(), WireError>),
    Pending(oneshot::Receiver<Result<(), WireError>>),
}

/// Completion handle of a non-blocking send.
pub struct SendHandle {
    state: SendState,
}

impl SendHandle {
    /// A send the link finished synchronously.
    pub fn completed() -> Self {
        Self {
            state: SendState::Done(Ok(())),
        }
    }

    /// A send the link will acknowledge on `ack` once flushed.
    pub fn pending(ack: oneshot::Receiver<Result<(), WireError>>) -> Self {
        Self {
            state: SendState::Pending(ack),
        }
    }

    /// Poll without blocking.
    pub fn is_complete(&mut self) -> bool {
        if let SendState::Pending(rx) = &mut self.state {
            match rx.try_recv() {
                Ok(result) => self.state = SendState::Done(result),
                Err(oneshot::error::TryRecvError::Empty) => return false,
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.state = SendState::Done(Err(link_dropped()));
                }
            }
        }
        true
    }

    /// Wait until the frame has been flushed by the link.
    pub async fn wait(self) -> Result<(), WireError> {
        match self.state {
            SendState::Done(result) => result,
            SendState::Pending(rx) => rx.await.unwrap_or_else(|_| Err(link_dropped())),
        }
    }
}

impl std::fmt::Debug for SendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            SendState::Done(Ok(())) => "done",
            SendState::Done(Err(_)) => "failed",
            SendState::Pending(_) => "pending",
        };
        f.debug_struct("SendHandle").field("state", &state).finish()
    }
}

fn link_dropped() -> WireError {
    WireError::Transport("link closed before the send was flushed".into())
}

/// A receive reported complete by [`CoordinatorChannel::wait_some`].
///
/// Owns the received frame; the channel keeps no copy.
#[derive(Debug)]
pub struct Completion {
    pub handle: RecvHandle,
    pub source: WorkerId,
    pub frame: Vec<u8>,
}

// ── Coordinator side ─────────────────────────────────────────────────

/// The coordinator's end of every worker link.
///
/// Enforces at most one posted receive per worker: posting a second one for
/// the same source is a protocol violation.
pub struct CoordinatorChannel {
    codec: FrameCodec,
    transmitter: Box<dyn Transmitter>,
    inbox: mpsc::UnboundedReceiver<Inbound>,
    workers: Vec<WorkerId>,
    posted: HashMap<RecvHandle, WorkerId>,
    by_source: HashMap<WorkerId, RecvHandle>,
    arrived: HashMap<WorkerId, VecDeque<Vec<u8>>>,
    next_handle: u64,
}

impl CoordinatorChannel {
    pub fn new(
        codec: FrameCodec,
        transmitter: Box<dyn Transmitter>,
        inbox: mpsc::UnboundedReceiver<Inbound>,
        workers: impl IntoIterator<Item = WorkerId>,
    ) -> Self {
        let mut workers: Vec<WorkerId> = workers.into_iter().collect();
        workers.sort();
        workers.dedup();
        Self {
            codec,
            transmitter,
            inbox,
            workers,
            posted: HashMap::new(),
            by_source: HashMap::new(),
            arrived: HashMap::new(),
            next_handle: 0,
        }
    }

    pub fn codec(&self) -> FrameCodec {
        self.codec
    }

    /// Worker ranks reachable through this channel, ascending.
    pub fn workers(&self) -> &[WorkerId] {
        &self.workers
    }

    /// The receive currently posted for `source`, if any.
    pub fn posted_for(&self, source: WorkerId) -> Option<RecvHandle> {
        self.by_source.get(&source).copied()
    }

    /// Frames from `source` received but not yet claimed by a receive.
    pub fn buffered(&self, source: WorkerId) -> usize {
        self.arrived.get(&source).map_or(0, VecDeque::len)
    }

    /// Number of posted receives.
    pub fn posted_len(&self) -> usize {
        self.posted.len()
    }

    fn ensure_known(&self, worker: WorkerId) -> Result<(), WireError> {
        if self.workers.binary_search(&worker).is_err() {
            return Err(WireError::ProtocolViolation(format!(
                "unknown worker {worker}"
            )));
        }
        Ok(())
    }

    /// Encode and enqueue a directive for `dest` without waiting for delivery.
    pub fn send_async(&self, dest: WorkerId, directive: &Directive) -> Result<SendHandle, WireError> {
        self.ensure_known(dest)?;
        let frame = self.codec.encode(directive)?;
        trace!(worker = %dest, topic = directive.topic(), "send posted");
        self.transmitter.transmit(dest, directive.topic(), frame)
    }

    /// Send `directive` to every worker.
    pub fn broadcast(&self, directive: &Directive) -> Result<Vec<SendHandle>, WireError> {
        let frame = self.codec.encode(directive)?;
        self.workers
            .iter()
            .map(|&w| self.transmitter.transmit(w, directive.topic(), frame.clone()))
            .collect()
    }

    /// Post a receive for `source`'s next frame.
    pub fn recv_async(&mut self, source: WorkerId) -> Result<RecvHandle, WireError> {
        self.ensure_known(source)?;
        if let Some(existing) = self.by_source.get(&source) {
            return Err(WireError::ProtocolViolation(format!(
                "receive {existing:?} already posted for worker {source}"
            )));
        }
        let handle = RecvHandle(self.next_handle);
        self.next_handle += 1;
        self.posted.insert(handle, source);
        self.by_source.insert(source, handle);
        trace!(worker = %source, ?handle, "receive posted");
        Ok(handle)
    }

    /// Withdraw a posted receive. Returns false if it was not posted.
    pub fn cancel(&mut self, handle: RecvHandle) -> bool {
        match self.posted.remove(&handle) {
            Some(source) => {
                self.by_source.remove(&source);
                true
            }
            None => false,
        }
    }

    /// Wait until at least one of `handles` completes, then return every one
    /// that is complete.
    ///
    /// An empty handle set returns immediately with no completions.
    pub async fn wait_some(&mut self, handles: &[RecvHandle]) -> Result<Vec<Completion>, WireError> {
        if handles.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(stray) = handles.iter().find(|h| !self.posted.contains_key(*h)) {
            return Err(WireError::ProtocolViolation(format!(
                "wait on receive {stray:?} that is not posted"
            )));
        }

        loop {
            self.drain_inbox()?;
            let done = self.take_ready(handles);
            if !done.is_empty() {
                debug!(completed = done.len(), awaited = handles.len(), "wait_some");
                return Ok(done);
            }
            match self.inbox.recv().await {
                Some(inbound) => self.accept(inbound)?,
                None => {
                    return Err(WireError::Transport(
                        "every worker link closed with receives outstanding".into(),
                    ))
                }
            }
        }
    }

    /// Move everything already queued into the per-source buffers.
    fn drain_inbox(&mut self) -> Result<(), WireError> {
        while let Ok(inbound) = self.inbox.try_recv() {
            self.accept(inbound)?;
        }
        Ok(())
    }

    fn accept(&mut self, inbound: Inbound) -> Result<(), WireError> {
        let (source, frame) = inbound?;
        self.ensure_known(source)?;
        self.codec.check_len(&frame)?;
        self.arrived.entry(source).or_default().push_back(frame);
        Ok(())
    }

    fn take_ready(&mut self, handles: &[RecvHandle]) -> Vec<Completion> {
        let mut done = Vec::new();
        for &handle in handles {
            let Some(&source) = self.posted.get(&handle) else {
                continue;
            };
            let Some(frame) = self.arrived.get_mut(&source).and_then(VecDeque::pop_front) else {
                continue;
            };
            self.posted.remove(&handle);
            self.by_source.remove(&source);
            done.push(Completion {
                handle,
                source,
                frame,
            });
        }
        done
    }
}

// ── Worker side ──────────────────────────────────────────────────────

/// A worker's end of its link, speaking [`Directive`]s and [`Report`]s.
pub struct WorkerChannel<L> {
    id: WorkerId,
    codec: FrameCodec,
    link: L,
}

impl<L: WorkerLink> WorkerChannel<L> {
    pub fn new(id: WorkerId, codec: FrameCodec, link: L) -> Self {
        Self { id, codec, link }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn codec(&self) -> FrameCodec {
        self.codec
    }

    /// Block until the coordinator sends an assignment or termination.
    ///
    /// The body must agree with the topic it arrived under.
    pub async fn next_directive(&mut self) -> Result<Directive, WireError> {
        let (topic, frame) = self.link.recv().await?;
        let directive: Directive = self.decode(&frame)?;
        if directive.topic() != topic {
            return Err(WireError::ProtocolViolation(format!(
                "{} body under topic {topic}",
                directive.topic()
            )));
        }
        Ok(directive)
    }

    pub async fn report(&mut self, report: &Report) -> Result<(), WireError> {
        let frame = self.codec.encode(report)?;
        self.link.send(topics::REPORT, frame).await
    }

    fn decode<T: DeserializeOwned>(&self, frame: &[u8]) -> Result<T, WireError> {
        self.codec.decode(frame)
    }
}
