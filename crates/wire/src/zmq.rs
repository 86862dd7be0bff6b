//! ZeroMQ link: one ROUTER socket on the coordinator, a DEALER per worker.
//!
//! Frames on the wire, as seen by each side:
//!
//! | direction | worker (DEALER) | coordinator (ROUTER) |
//! |---|---|---|
//! | worker → coordinator | `[topic, frame]` | `[identity, topic, frame]` |
//! | coordinator → worker | `[topic, frame]` | `[identity, topic, frame]` |
//!
//! The ROUTER learns a peer's identity only from inbound traffic, so a worker
//! opens with `[HELLO, rank as u32 LE]`. [`ZmqCoordinatorLink::bind`] returns
//! once every rank has done so.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use zeromq::prelude::*;
use zeromq::{DealerSocket, RouterSocket, ZmqMessage};

use crate::channel::{CoordinatorChannel, Inbound, SendHandle};
use crate::error::WireError;
use crate::frame::FrameCodec;
use crate::protocol::WorkerId;
use crate::topics;
use crate::traits::{Transmitter, WorkerLink};

/// Pause between connection attempts of a worker whose coordinator is not up yet.
const CONNECT_RETRY: Duration = Duration::from_millis(200);

/// Internal command sent from the channel to the background event loop.
struct SendCommand {
    zmq_msg: ZmqMessage,
    ack: oneshot::Sender<Result<(), WireError>>,
}

// ── Coordinator side ─────────────────────────────────────────────────

/// Coordinator end of the ZeroMQ link.
pub struct ZmqCoordinatorLink;

impl ZmqCoordinatorLink {
    /// Bind a ROUTER socket and wait for all `workers` ranks to say hello.
    ///
    /// Returns [`WireError::Timeout`] if some rank has not announced itself
    /// within `hello_timeout`.
    #[instrument(skip_all, fields(endpoint = %transport, workers = workers))]
    pub async fn bind(
        transport: &crate::transport::Transport,
        workers: u32,
        codec: FrameCodec,
        hello_timeout: Duration,
    ) -> Result<CoordinatorChannel, WireError> {
        transport.ensure_ipc_dir()?;
        transport.remove_stale_socket()?;
        let mut socket = RouterSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "binding ROUTER socket");
        socket.bind(&endpoint).await?;

        let identities = Self::collect_hellos(&mut socket, workers, hello_timeout).await?;
        info!(workers, "all workers announced");

        let ranks: HashMap<Vec<u8>, WorkerId> = identities
            .iter()
            .map(|(id, identity)| (identity.clone(), *id))
            .collect();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel::<Inbound>();
        let (send_tx, send_rx) = mpsc::unbounded_channel::<SendCommand>();
        tokio::spawn(async move {
            Self::event_loop(socket, send_rx, inbox_tx, ranks).await;
        });

        let transmitter = ZmqTransmitter {
            send_tx,
            identities,
        };
        Ok(CoordinatorChannel::new(
            codec,
            Box::new(transmitter),
            inbox_rx,
            (0..workers).map(WorkerId),
        ))
    }

    async fn collect_hellos(
        socket: &mut RouterSocket,
        workers: u32,
        hello_timeout: Duration,
    ) -> Result<HashMap<WorkerId, Vec<u8>>, WireError> {
        let deadline = Instant::now() + hello_timeout;
        let mut identities: HashMap<WorkerId, Vec<u8>> = HashMap::new();

        while identities.len() < workers as usize {
            let zmq_msg = tokio::time::timeout_at(deadline, socket.recv())
                .await
                .map_err(|_| WireError::Timeout(hello_timeout))??;
            let (identity, topic, payload) = split_router_frames(&zmq_msg)?;
            if topic != topics::HELLO.as_bytes() {
                return Err(WireError::ProtocolViolation(format!(
                    "expected hello, got topic {:?}",
                    String::from_utf8_lossy(topic)
                )));
            }
            let rank = decode_rank(payload)?;
            if rank.0 >= workers {
                return Err(WireError::ProtocolViolation(format!(
                    "worker rank {rank} out of range 0..{workers}"
                )));
            }
            if identities.insert(rank, identity.to_vec()).is_some() {
                return Err(WireError::ProtocolViolation(format!(
                    "worker rank {rank} announced twice"
                )));
            }
            debug!(worker = %rank, "hello");
        }
        Ok(identities)
    }

    /// Single-threaded event loop owning the ROUTER socket.
    ///
    /// Uses `tokio::select!` to multiplex sends and receives on the same
    /// socket. Ends when the channel (and with it the send queue) is dropped.
    async fn event_loop(
        mut socket: RouterSocket,
        mut send_rx: mpsc::UnboundedReceiver<SendCommand>,
        inbox: mpsc::UnboundedSender<Inbound>,
        ranks: HashMap<Vec<u8>, WorkerId>,
    ) {
        loop {
            tokio::select! {
                cmd = send_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    match socket.send(cmd.zmq_msg).await {
                        Ok(()) => {
                            let _ = cmd.ack.send(Ok(()));
                        }
                        Err(e) => {
                            warn!(error = %e, "ROUTER send failed");
                            let _ = cmd.ack.send(Err(WireError::Transport(e.to_string())));
                            let _ = inbox.send(Err(WireError::Zmq(e)));
                        }
                    }
                }
                result = socket.recv() => {
                    match result {
                        Ok(zmq_msg) => {
                            let _ = inbox.send(Self::route(&zmq_msg, &ranks));
                        }
                        Err(e) => {
                            debug!(error = %e, "ROUTER recv loop ending");
                            let _ = inbox.send(Err(WireError::Zmq(e)));
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Map an inbound message to its worker rank.
    fn route(zmq_msg: &ZmqMessage, ranks: &HashMap<Vec<u8>, WorkerId>) -> Inbound {
        let (identity, topic, payload) = split_router_frames(zmq_msg)?;
        let rank = *ranks.get(identity).ok_or_else(|| {
            WireError::ProtocolViolation("frame from a peer that never said hello".into())
        })?;
        if topic != topics::REPORT.as_bytes() {
            return Err(WireError::ProtocolViolation(format!(
                "worker {rank} sent unexpected topic {:?}",
                String::from_utf8_lossy(topic)
            )));
        }
        Ok((rank, payload.to_vec()))
    }
}

/// Split `[identity, (empty delimiters), topic, payload]`.
fn split_router_frames(zmq_msg: &ZmqMessage) -> Result<(&[u8], &[u8], &[u8]), WireError> {
    let frames: Vec<&[u8]> = zmq_msg.iter().map(|f| f.as_ref()).collect();
    let Some((identity, rest)) = frames.split_first() else {
        return Err(WireError::MalformedFrame("empty ROUTER message".into()));
    };
    let data: Vec<&[u8]> = rest.iter().copied().skip_while(|f| f.is_empty()).collect();
    match data.as_slice() {
        [topic, payload] => Ok((*identity, *topic, *payload)),
        other => Err(WireError::MalformedFrame(format!(
            "expected [topic, payload] after identity, got {} frames",
            other.len()
        ))),
    }
}

fn decode_rank(payload: &[u8]) -> Result<WorkerId, WireError> {
    let bytes: [u8; 4] = payload.try_into().map_err(|_| {
        WireError::MalformedFrame(format!("hello payload of {} bytes", payload.len()))
    })?;
    Ok(WorkerId(u32::from_le_bytes(bytes)))
}

struct ZmqTransmitter {
    send_tx: mpsc::UnboundedSender<SendCommand>,
    identities: HashMap<WorkerId, Vec<u8>>,
}

impl Transmitter for ZmqTransmitter {
    fn transmit(
        &self,
        dest: WorkerId,
        topic: &'static str,
        frame: Vec<u8>,
    ) -> Result<SendHandle, WireError> {
        let identity = self
            .identities
            .get(&dest)
            .ok_or_else(|| WireError::ProtocolViolation(format!("unknown worker {dest}")))?;
        let mut zmq_msg = ZmqMessage::from(identity.clone());
        zmq_msg.push_back(topic.as_bytes().to_vec().into());
        zmq_msg.push_back(frame.into());

        let (ack, done) = oneshot::channel();
        self.send_tx
            .send(SendCommand { zmq_msg, ack })
            .map_err(|_| WireError::Transport("coordinator event loop closed".into()))?;
        Ok(SendHandle::pending(done))
    }
}

// ── Worker side ──────────────────────────────────────────────────────

/// Worker end of the ZeroMQ link: a DEALER socket owned by the worker loop.
pub struct ZmqWorkerLink {
    socket: DealerSocket,
}

impl ZmqWorkerLink {
    /// Connect to the coordinator and announce `rank`.
    ///
    /// Retries until `timeout` so workers may start before the coordinator.
    #[instrument(skip_all, fields(endpoint = %transport, worker = %rank))]
    pub async fn connect(
        transport: &crate::transport::Transport,
        rank: WorkerId,
        timeout: Duration,
    ) -> Result<Self, WireError> {
        let endpoint = transport.endpoint();
        let deadline = Instant::now() + timeout;
        let mut socket = loop {
            let mut socket = DealerSocket::new();
            match socket.connect(&endpoint).await {
                Ok(()) => break socket,
                Err(e) if Instant::now() + CONNECT_RETRY < deadline => {
                    debug!(error = %e, "coordinator not reachable yet, retrying");
                    tokio::time::sleep(CONNECT_RETRY).await;
                }
                Err(e) => {
                    warn!(error = %e, "giving up on coordinator");
                    return Err(WireError::Timeout(timeout));
                }
            }
        };
        info!(endpoint = %endpoint, "connected DEALER socket");

        let mut hello = ZmqMessage::from(topics::HELLO);
        hello.push_back(rank.0.to_le_bytes().to_vec().into());
        socket.send(hello).await?;
        Ok(Self { socket })
    }
}

#[async_trait]
impl WorkerLink for ZmqWorkerLink {
    async fn recv(&mut self) -> Result<(&'static str, Vec<u8>), WireError> {
        let zmq_msg = self.socket.recv().await?;
        let frames: Vec<&[u8]> = zmq_msg
            .iter()
            .map(|f| f.as_ref())
            .skip_while(|f| f.is_empty())
            .collect();
        match frames.as_slice() {
            [topic, payload] if *topic == topics::ASSIGN.as_bytes() => {
                Ok((topics::ASSIGN, payload.to_vec()))
            }
            [topic, payload] if *topic == topics::TERMINATE.as_bytes() => {
                Ok((topics::TERMINATE, payload.to_vec()))
            }
            [topic, _] => Err(WireError::ProtocolViolation(format!(
                "unexpected topic {:?} from coordinator",
                String::from_utf8_lossy(topic)
            ))),
            other => Err(WireError::MalformedFrame(format!(
                "expected [topic, payload], got {} frames",
                other.len()
            ))),
        }
    }

    async fn send(&mut self, topic: &'static str, frame: Vec<u8>) -> Result<(), WireError> {
        let mut zmq_msg = ZmqMessage::from(topic);
        zmq_msg.push_back(frame.into());
        self.socket.send(zmq_msg).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_payload_roundtrip() {
        assert_eq!(decode_rank(&7u32.to_le_bytes()).unwrap(), WorkerId(7));
        assert!(matches!(
            decode_rank(&[1, 2, 3]),
            Err(WireError::MalformedFrame(_))
        ));
    }

    #[test]
    fn router_frames_skip_delimiters() {
        let mut msg = ZmqMessage::from(vec![9u8, 9]);
        msg.push_back(Vec::<u8>::new().into());
        msg.push_back(topics::REPORT.as_bytes().to_vec().into());
        msg.push_back(vec![1u8, 2, 3].into());
        let (identity, topic, payload) = split_router_frames(&msg).unwrap();
        assert_eq!(identity, &[9, 9]);
        assert_eq!(topic, topics::REPORT.as_bytes());
        assert_eq!(payload, &[1, 2, 3]);
    }

    #[test]
    fn route_rejects_strangers() {
        let mut msg = ZmqMessage::from(vec![1u8]);
        msg.push_back(topics::REPORT.as_bytes().to_vec().into());
        msg.push_back(vec![0u8].into());
        let ranks = HashMap::from([(vec![2u8], WorkerId(0))]);
        assert!(matches!(
            ZmqCoordinatorLink::route(&msg, &ranks),
            Err(WireError::ProtocolViolation(_))
        ));
    }
}
