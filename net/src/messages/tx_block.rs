//! `tx`/`block` — the actual payloads inventory exchange was negotiating.
//! Transaction/block validation is out of scope (spec.md §1); the payload
//! is handed to [`crate::hooks::Blockchain`] opaquely and this layer only
//! tracks the hash for inventory bookkeeping.

use crate::codec::tlv::{SObjBuilder, SVal};
use crate::codec::Hash256;
use crate::error::PeerResult;
use crate::messages::{Command, WireMessage};
use crate::node::{Node, Peer};

#[derive(Clone, Debug, PartialEq)]
pub struct TxMessage {
    pub raw: Vec<u8>,
}

impl WireMessage for TxMessage {
    const COMMAND: Command = Command::Tx;

    fn encode_payload(&self) -> Vec<u8> {
        self.raw.clone()
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        Ok(TxMessage { raw: payload.to_vec() })
    }

    fn to_value(&self) -> SVal {
        SObjBuilder::new().with("bytes", self.raw.len() as i64).build()
    }

    fn apply(&self, node: &Node, peer: &mut Peer) -> PeerResult<()> {
        let hash = Hash256::from_payload(&self.raw);
        peer.take_pending_getdata(&hash);
        peer.remember_known(hash);
        node.blockchain.add_tx(hash, &self.raw);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BlockMessage {
    pub raw: Vec<u8>,
}

impl WireMessage for BlockMessage {
    const COMMAND: Command = Command::Block;

    fn encode_payload(&self) -> Vec<u8> {
        self.raw.clone()
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        Ok(BlockMessage { raw: payload.to_vec() })
    }

    fn to_value(&self) -> SVal {
        SObjBuilder::new().with("bytes", self.raw.len() as i64).build()
    }

    fn apply(&self, node: &Node, peer: &mut Peer) -> PeerResult<()> {
        let hash = Hash256::from_payload(&self.raw);
        peer.take_pending_getdata(&hash);
        peer.remember_known(hash);
        node.blockchain.add_block(hash, &self.raw);
        Ok(())
    }
}
