//! The transport state machine layer (spec.md §4.4). [`MessageTransport`]
//! drives one [`Connection`] through `AWAIT_HANDSHAKE -> STREAMING ->
//! CLOSING -> CLOSED`, feeding decoded frames to the [`Peer`] FSM and
//! flushing whatever `Peer::apply` enqueued back onto the wire.
//! Generalizes the teacher's `NodeConnection::proceed_conversation`
//! (single `ConversationTopicHandler`, outbound-only) to both connection
//! directions and the full 26-command surface via the registry.
//!
//! [`http`] and [`websocket`] carry the same `Transport` capability
//! surface as thin marker types (spec.md §1/§4.4 scope this core to the
//! message transport only; the other two variants exist so the
//! registry-of-transports shape is visible, not as depth).

pub mod http;
pub mod websocket;

use std::sync::Arc;

use rand::RngCore;
use tokio::time::{timeout, Duration};

use crate::codec::frame::{self, FrameParseOutcome};
use crate::conn::Connection;
use crate::error::{PeerError, PeerResult};
use crate::messages::{PingMessage, ProtocolMessage};
use crate::node::{Node, Peer, PeerState};
use crate::registry;
use crate::scheduler::timer::{TimerId, TimerOutcome, TimerWheel};

/// Identifies which protocol binding a [`Transport`] implements.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransportKind {
    Message,
    Http,
    WebSocket,
}

/// The capability surface a connection's protocol binding exposes to the
/// scheduler (spec.md §4.3: "Transport ... handler, metrics counters,
/// reference to target peer"). Only [`MessageTransport`] implements the
/// full state machine; the other variants are markers.
pub trait Transport {
    fn kind(&self) -> TransportKind;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransportState {
    AwaitHandshake,
    Streaming,
    Closing,
    Closed,
}

pub struct MessageTransport {
    state: TransportState,
    connection: Connection,
    peer: Peer,
    node: Arc<Node>,
    /// Drives the periodic `ping` / `pong`-deadline liveness check (spec.md
    /// §4.5). Empty until the handshake completes, since there is nothing
    /// to ping before a peer is READY.
    timers: TimerWheel,
    ping_timer: Option<TimerId>,
    pong_deadline: Option<TimerId>,
}

impl Transport for MessageTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Message
    }
}

impl MessageTransport {
    pub fn new(connection: Connection, peer: Peer, node: Arc<Node>) -> Self {
        MessageTransport {
            state: TransportState::AwaitHandshake,
            connection,
            peer,
            node,
            timers: TimerWheel::new(),
            ping_timer: None,
            pong_deadline: None,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// Drives the connection to completion: handshake, then streaming
    /// request/response traffic, until the peer closes or a fatal error
    /// occurs. Soft protocol errors (unknown command, a single malformed
    /// frame) are logged and the connection carries on; handshake/registry
    /// errors and I/O errors end the session.
    pub async fn run(mut self) -> PeerResult<()> {
        if self.peer.is_outbound {
            self.send_our_version().await?;
        }

        loop {
            match self.state {
                TransportState::Closed => return Ok(()),
                TransportState::Closing => {
                    self.connection.shutdown().await.ok();
                    self.state = TransportState::Closed;
                    continue;
                }
                TransportState::AwaitHandshake | TransportState::Streaming => {}
            }

            self.flush_outbound().await?;

            if self.state == TransportState::AwaitHandshake {
                let n = match self.read_with_timeout(Some(self.node.config.handshake_timeout)).await {
                    Ok(n) => n,
                    Err(PeerError::Timeout(msg)) => {
                        log::warn!("peer {}: {msg}", self.peer.remote_addr);
                        self.peer.close("handshake timeout");
                        self.state = TransportState::Closing;
                        continue;
                    }
                    Err(err) => return Err(err),
                };

                if n == 0 {
                    self.peer.close("remote closed the connection");
                    self.state = TransportState::Closing;
                    continue;
                }

                self.drain_frames()?;

                if self.peer.state() == PeerState::Closing {
                    self.state = TransportState::Closing;
                } else if self.peer.is_ready() {
                    self.state = TransportState::Streaming;
                    self.arm_next_ping();
                }
                continue;
            }

            // Streaming: race incoming bytes against the ping-interval /
            // pong-deadline timer wheel, so a quiet connection still gets
            // probed for liveness instead of parking on `read_more()`
            // forever.
            if self.timers.is_empty() {
                let n = self.connection.read_more().await?;
                if n == 0 {
                    self.peer.close("remote closed the connection");
                    self.state = TransportState::Closing;
                    continue;
                }
                self.drain_frames()?;
            } else {
                tokio::select! {
                    result = self.connection.read_more() => {
                        let n = result?;
                        if n == 0 {
                            self.peer.close("remote closed the connection");
                            self.state = TransportState::Closing;
                            continue;
                        }
                        self.drain_frames()?;
                    }
                    outcome = self.timers.wait_next() => {
                        self.handle_timer(outcome).await?;
                    }
                }
            }
            self.cancel_pong_deadline_if_resolved();

            if self.peer.state() == PeerState::Closing {
                self.state = TransportState::Closing;
            }
        }
    }

    /// Arms the recurring ping-interval timer. Called once, right after the
    /// handshake completes.
    fn arm_next_ping(&mut self) {
        self.ping_timer = Some(self.timers.schedule(self.node.config.ping_interval));
    }

    async fn send_ping(&mut self) -> PeerResult<()> {
        let nonce = rand::thread_rng().next_u64();
        self.peer.arm_ping(nonce);
        self.peer.enqueue(ProtocolMessage::Ping(PingMessage { nonce }));
        self.flush_outbound().await?;
        self.pong_deadline = Some(self.timers.schedule(self.node.config.pong_timeout));
        Ok(())
    }

    /// A resolved pong cancels the deadline that would otherwise close the
    /// peer; an unresolved one at the deadline is a `pong-timeout` close
    /// per spec.md §4.5 / §8 scenario 2.
    async fn handle_timer(&mut self, outcome: Option<TimerOutcome>) -> PeerResult<()> {
        let id = match outcome {
            Some(TimerOutcome::Fired(id)) => id,
            Some(TimerOutcome::Canceled(_)) | None => return Ok(()),
        };
        if Some(id) == self.ping_timer {
            self.ping_timer = None;
            // Only one ping is ever outstanding at a time: if the last one
            // hasn't been answered yet, its own deadline timer is already
            // armed and governs the close, so don't clobber it with a
            // fresh one.
            if self.peer.last_ping_nonce.is_none() {
                self.send_ping().await?;
            }
            self.arm_next_ping();
        } else if Some(id) == self.pong_deadline {
            self.pong_deadline = None;
            if self.peer.last_ping_nonce.is_some() {
                self.peer.close("pong-timeout");
            }
        }
        Ok(())
    }

    fn cancel_pong_deadline_if_resolved(&mut self) {
        if self.peer.last_ping_nonce.is_none() {
            if let Some(id) = self.pong_deadline.take() {
                self.timers.cancel(id);
            }
        }
    }

    async fn read_with_timeout(&mut self, duration: Option<Duration>) -> PeerResult<usize> {
        match duration {
            Some(d) => match timeout(d, self.connection.read_more()).await {
                Ok(result) => result,
                Err(_) => Err(PeerError::timeout("no data before handshake deadline")),
            },
            None => self.connection.read_more().await,
        }
    }

    fn drain_frames(&mut self) -> PeerResult<()> {
        loop {
            let magic = self.node.magic();
            let max_payload = self.node.config.max_payload as usize;
            match frame::try_parse(self.connection.inbound(), magic, max_payload)? {
                FrameParseOutcome::NeedMore => return Ok(()),
                FrameParseOutcome::Frame { frame, consumed } => {
                    self.connection.consume(consumed);
                    self.handle_frame(frame.command, &frame.payload)?;
                    if self.peer.state() == PeerState::Closing {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn handle_frame(&mut self, command_str: String, payload: &[u8]) -> PeerResult<()> {
        let command = match registry::lookup(&command_str) {
            Some(c) => c,
            None => {
                log::warn!("peer {}: ignoring unknown command '{command_str}'", self.peer.remote_addr);
                return Ok(());
            }
        };

        if let Err(err) = self.peer.validate_incoming(command) {
            log::warn!("peer {}: {err}", self.peer.remote_addr);
            self.peer.close("handshake ordering violation");
            return Ok(());
        }

        match ProtocolMessage::decode(command, payload) {
            Ok(message) => {
                if let Err(err) = message.apply(&self.node, &mut self.peer) {
                    log::warn!("peer {}: error applying '{command_str}': {err}", self.peer.remote_addr);
                    if err.is_connection_fatal() {
                        self.peer.close("fatal error applying message");
                    }
                }
            }
            Err(err) => {
                log::warn!("peer {}: malformed '{command_str}' payload: {err}", self.peer.remote_addr);
            }
        }
        Ok(())
    }

    async fn send_our_version(&mut self) -> PeerResult<()> {
        let version = self.node.make_version(&self.peer);
        self.peer.mark_version_sent();
        let bytes = ProtocolMessage::Version(version).to_frame_bytes(self.node.magic());
        self.connection.write_all(&bytes).await
    }

    async fn flush_outbound(&mut self) -> PeerResult<()> {
        let magic = self.node.magic();
        while let Some(message) = self.peer.pop_outbound() {
            let bytes = message.to_frame_bytes(magic);
            self.connection.write_all(&bytes).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // `run()` needs live sockets and is exercised by the crate's loopback
    // integration tests; this module sticks to the pure state-transition
    // rules that don't need an event loop.

    #[test]
    fn transport_states_are_distinct() {
        assert_ne!(TransportState::AwaitHandshake, TransportState::Streaming);
        assert_ne!(TransportState::Closing, TransportState::Closed);
    }
}

#[cfg(test)]
mod kind_test {
    use super::*;

    #[test]
    fn message_transport_reports_its_kind() {
        let node = Arc::new(crate::node::test_support::plain_node());
        let peer = Peer::new("127.0.0.1:1".parse().unwrap(), true, node.self_nonce);
        // Connection::new requires a live socket; kind() doesn't need one,
        // so this test only checks the Transport::kind plumbing via the
        // marker types instead of constructing a live MessageTransport.
        assert_eq!(http::HttpTransport.kind(), TransportKind::Http);
        assert_eq!(websocket::WebSocketTransport.kind(), TransportKind::WebSocket);
        let _ = (node, peer);
    }
}
