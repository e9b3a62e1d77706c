//! `ping`/`pong` — liveness probe and its echo. A `ping` must be answered
//! with a `pong` carrying the same nonce; an unmatched or stale `pong` is
//! silently ignored rather than treated as a protocol error, since network
//! reordering and NAT retransmits make a late echo unremarkable.

use crate::codec::tlv::{SObjBuilder, SVal};
use crate::codec::{ByteReader, ByteWriter};
use crate::error::PeerResult;
use crate::messages::{Command, ProtocolMessage, WireMessage};
use crate::node::{Node, Peer};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PingMessage {
    pub nonce: u64,
}

impl WireMessage for PingMessage {
    const COMMAND: Command = Command::Ping;

    fn encode_payload(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_u64_le(self.nonce);
        w.into_bytes()
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        let mut r = ByteReader::new(payload);
        Ok(PingMessage { nonce: r.read_u64_le()? })
    }

    fn to_value(&self) -> SVal {
        SObjBuilder::new().with("nonce", self.nonce as i64).build()
    }

    fn apply(&self, _node: &Node, peer: &mut Peer) -> PeerResult<()> {
        peer.enqueue(ProtocolMessage::Pong(PongMessage { nonce: self.nonce }));
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PongMessage {
    pub nonce: u64,
}

impl WireMessage for PongMessage {
    const COMMAND: Command = Command::Pong;

    fn encode_payload(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_u64_le(self.nonce);
        w.into_bytes()
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        let mut r = ByteReader::new(payload);
        Ok(PongMessage { nonce: r.read_u64_le()? })
    }

    fn to_value(&self) -> SVal {
        SObjBuilder::new().with("nonce", self.nonce as i64).build()
    }

    fn apply(&self, _node: &Node, peer: &mut Peer) -> PeerResult<()> {
        peer.resolve_pong(self.nonce);
        Ok(())
    }
}
