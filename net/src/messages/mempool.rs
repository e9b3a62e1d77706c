//! `mempool`/`feefilter`/`sendheaders` — relay-policy negotiation. Mempool
//! contents are out of scope (spec.md §1 excludes mempool policy), so
//! `mempool` gets an honest empty `inv` reply rather than fabricated
//! transactions; `feefilter`/`sendheaders` just record the peer's stated
//! preference for later relay decisions.

use crate::codec::tlv::{SObjBuilder, SVal};
use crate::codec::{ByteReader, ByteWriter};
use crate::error::PeerResult;
use crate::messages::{no_payload, require_empty, Command, ProtocolMessage, WireMessage};
use crate::node::{Node, Peer};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemPoolMessage;

impl WireMessage for MemPoolMessage {
    const COMMAND: Command = Command::MemPool;

    fn encode_payload(&self) -> Vec<u8> {
        no_payload()
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        require_empty(payload)?;
        Ok(MemPoolMessage)
    }

    fn to_value(&self) -> SVal {
        SVal::Null
    }

    fn apply(&self, _node: &Node, peer: &mut Peer) -> PeerResult<()> {
        peer.enqueue(ProtocolMessage::Inv(crate::messages::InvMessage { items: Vec::new() }));
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeFilterMessage {
    pub fee_rate: u64,
}

impl WireMessage for FeeFilterMessage {
    const COMMAND: Command = Command::FeeFilter;

    fn encode_payload(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_u64_le(self.fee_rate);
        w.into_bytes()
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        let mut r = ByteReader::new(payload);
        Ok(FeeFilterMessage { fee_rate: r.read_u64_le()? })
    }

    fn to_value(&self) -> SVal {
        SObjBuilder::new().with("fee_rate", self.fee_rate as i64).build()
    }

    fn apply(&self, _node: &Node, peer: &mut Peer) -> PeerResult<()> {
        peer.min_fee_rate = self.fee_rate;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SendHeadersMessage;

impl WireMessage for SendHeadersMessage {
    const COMMAND: Command = Command::SendHeaders;

    fn encode_payload(&self) -> Vec<u8> {
        no_payload()
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        require_empty(payload)?;
        Ok(SendHeadersMessage)
    }

    fn to_value(&self) -> SVal {
        SVal::Null
    }

    fn apply(&self, _node: &Node, peer: &mut Peer) -> PeerResult<()> {
        peer.prefers_headers = true;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn feefilter_roundtrips_and_applies() {
        let msg = FeeFilterMessage { fee_rate: 1000 };
        assert_eq!(FeeFilterMessage::decode_payload(&msg.encode_payload()).unwrap(), msg);
        let node = crate::node::test_support::plain_node();
        let mut peer = Peer::new("127.0.0.1:1".parse().unwrap(), true, node.self_nonce);
        msg.apply(&node, &mut peer).unwrap();
        assert_eq!(peer.min_fee_rate, 1000);
    }

    #[test]
    fn sendheaders_apply_sets_peer_preference() {
        let node = crate::node::test_support::plain_node();
        let mut peer = Peer::new("127.0.0.1:1".parse().unwrap(), true, node.self_nonce);
        SendHeadersMessage.apply(&node, &mut peer).unwrap();
        assert!(peer.prefers_headers);
    }
}
