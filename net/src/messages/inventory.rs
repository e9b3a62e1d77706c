//! `inv`/`getdata`/`notfound` — inventory announcement and retrieval.
//! All three share the `CompactSize count | InventoryVector[count]` shape;
//! grounded in `original_source/src/protocol/messages/InvMessage.{hpp,cpp}`
//! and its `GetDataMessage`/`NotFoundMessage` siblings.

use crate::codec::tlv::SVal;
use crate::codec::varint::CompactSize;
use crate::codec::{ByteReader, ByteWriter, InventoryType, InventoryVector};
use crate::error::PeerResult;
use crate::messages::{Command, ProtocolMessage, WireMessage};
use crate::node::{Node, Peer};

fn encode_inv_list(items: &[InventoryVector]) -> Vec<u8> {
    let mut w = ByteWriter::new();
    CompactSize::from(items.len()).write(&mut w);
    for inv in items {
        w.write_inv_vector(inv);
    }
    w.into_bytes()
}

fn decode_inv_list(payload: &[u8]) -> PeerResult<Vec<InventoryVector>> {
    let mut r = ByteReader::new(payload);
    let count = CompactSize::read(&mut r)?.as_usize();
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(r.read_inv_vector()?);
    }
    Ok(items)
}

fn inv_list_to_value(items: &[InventoryVector]) -> SVal {
    SVal::Arr(
        items
            .iter()
            .map(|i| SVal::Str(format!("{:?}:{}", i.kind, i.hash)))
            .collect(),
    )
}

#[derive(Clone, Debug, PartialEq)]
pub struct InvMessage {
    pub items: Vec<InventoryVector>,
}

impl WireMessage for InvMessage {
    const COMMAND: Command = Command::Inv;

    fn encode_payload(&self) -> Vec<u8> {
        encode_inv_list(&self.items)
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        Ok(InvMessage { items: decode_inv_list(payload)? })
    }

    fn to_value(&self) -> SVal {
        inv_list_to_value(&self.items)
    }

    fn apply(&self, node: &Node, peer: &mut Peer) -> PeerResult<()> {
        let mut wanted = Vec::new();
        for inv in &self.items {
            peer.remember_known(inv.hash);
            let already_have = match inv.kind {
                InventoryType::MsgTx => node.blockchain.have_tx(&inv.hash),
                InventoryType::MsgBlock | InventoryType::MsgCmpctBlock | InventoryType::MsgFilteredBlock => {
                    node.blockchain.have_block(&inv.hash)
                }
                InventoryType::Error | InventoryType::Unknown(_) => true,
            };
            if !already_have {
                peer.record_getdata_sent(inv.hash, inv.kind);
                wanted.push(*inv);
            }
        }
        if !wanted.is_empty() {
            peer.enqueue(ProtocolMessage::GetData(GetDataMessage { items: wanted }));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GetDataMessage {
    pub items: Vec<InventoryVector>,
}

impl WireMessage for GetDataMessage {
    const COMMAND: Command = Command::GetData;

    fn encode_payload(&self) -> Vec<u8> {
        encode_inv_list(&self.items)
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        Ok(GetDataMessage { items: decode_inv_list(payload)? })
    }

    fn to_value(&self) -> SVal {
        inv_list_to_value(&self.items)
    }

    fn apply(&self, node: &Node, peer: &mut Peer) -> PeerResult<()> {
        let mut missing = Vec::new();
        for inv in &self.items {
            match inv.kind {
                InventoryType::MsgTx => match node.blockchain.fetch_tx(&inv.hash) {
                    Some(raw) => peer.enqueue(ProtocolMessage::Tx(crate::messages::TxMessage { raw })),
                    None => missing.push(*inv),
                },
                InventoryType::MsgBlock => match node.blockchain.fetch_block(&inv.hash) {
                    Some(raw) => peer.enqueue(ProtocolMessage::Block(crate::messages::BlockMessage { raw })),
                    None => missing.push(*inv),
                },
                InventoryType::MsgFilteredBlock | InventoryType::MsgCmpctBlock | InventoryType::Error | InventoryType::Unknown(_) => {
                    missing.push(*inv);
                }
            }
        }
        if !missing.is_empty() {
            peer.enqueue(ProtocolMessage::NotFound(NotFoundMessage { items: missing }));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NotFoundMessage {
    pub items: Vec<InventoryVector>,
}

impl WireMessage for NotFoundMessage {
    const COMMAND: Command = Command::NotFound;

    fn encode_payload(&self) -> Vec<u8> {
        encode_inv_list(&self.items)
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        Ok(NotFoundMessage { items: decode_inv_list(payload)? })
    }

    fn to_value(&self) -> SVal {
        inv_list_to_value(&self.items)
    }

    fn apply(&self, _node: &Node, peer: &mut Peer) -> PeerResult<()> {
        for inv in &self.items {
            peer.take_pending_getdata(&inv.hash);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::Hash256;

    fn sample_items() -> Vec<InventoryVector> {
        vec![
            InventoryVector { kind: InventoryType::MsgTx, hash: Hash256([1u8; 32]) },
            InventoryVector { kind: InventoryType::MsgBlock, hash: Hash256([2u8; 32]) },
        ]
    }

    #[test]
    fn inv_getdata_notfound_all_roundtrip() {
        let items = sample_items();
        assert_eq!(InvMessage::decode_payload(&InvMessage { items: items.clone() }.encode_payload()).unwrap().items, items);
        assert_eq!(GetDataMessage::decode_payload(&GetDataMessage { items: items.clone() }.encode_payload()).unwrap().items, items);
        assert_eq!(NotFoundMessage::decode_payload(&NotFoundMessage { items: items.clone() }.encode_payload()).unwrap().items, items);
    }

    #[test]
    fn inv_apply_requests_only_unknown_items() {
        let node = crate::node::test_support::plain_node();
        let hash = Hash256([3u8; 32]);
        node.blockchain.add_tx(hash, b"already-have");
        let mut peer = Peer::new("127.0.0.1:1".parse().unwrap(), true, node.self_nonce);
        let items = vec![
            InventoryVector { kind: InventoryType::MsgTx, hash },
            InventoryVector { kind: InventoryType::MsgTx, hash: Hash256([4u8; 32]) },
        ];
        InvMessage { items }.apply(&node, &mut peer).unwrap();
        match peer.pop_outbound().unwrap() {
            ProtocolMessage::GetData(g) => {
                assert_eq!(g.items.len(), 1);
                assert_eq!(g.items[0].hash, Hash256([4u8; 32]));
            }
            _ => panic!("expected a getdata"),
        }
    }

    #[test]
    fn getdata_apply_replies_notfound_for_missing_items() {
        let node = crate::node::test_support::plain_node();
        let mut peer = Peer::new("127.0.0.1:1".parse().unwrap(), true, node.self_nonce);
        GetDataMessage { items: sample_items() }.apply(&node, &mut peer).unwrap();
        match peer.pop_outbound().unwrap() {
            ProtocolMessage::NotFound(nf) => assert_eq!(nf.items.len(), 2),
            _ => panic!("expected notfound"),
        }
    }
}
