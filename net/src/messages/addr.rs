//! `getaddr`/`addr` — peer discovery. `getaddr` carries no payload;
//! `addr` carries a CompactSize-prefixed list of timestamped network
//! addresses, grounded in `original_source/src/protocol/messages/AddrMessage.{hpp,cpp}`.

use crate::codec::tlv::SVal;
use crate::codec::varint::CompactSize;
use crate::codec::{ByteReader, ByteWriter, NetworkAddress};
use crate::error::{PeerError, PeerResult};
use crate::messages::{no_payload, require_empty, Command, WireMessage};
use crate::node::{Node, Peer};

/// Largest `addr` list this implementation will accept in one message,
/// mirroring the de-facto wire limit used by the reference network.
const MAX_ADDR_ENTRIES: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GetAddrMessage;

impl WireMessage for GetAddrMessage {
    const COMMAND: Command = Command::GetAddr;

    fn encode_payload(&self) -> Vec<u8> {
        no_payload()
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        require_empty(payload)?;
        Ok(GetAddrMessage)
    }

    fn to_value(&self) -> SVal {
        SVal::Null
    }

    fn apply(&self, node: &Node, peer: &mut Peer) -> PeerResult<()> {
        let sample = node.address_book.sample(MAX_ADDR_ENTRIES, 3 * 60 * 60);
        if !sample.is_empty() {
            peer.enqueue(crate::messages::ProtocolMessage::Addr(AddrMessage { addresses: sample }));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AddrMessage {
    pub addresses: Vec<NetworkAddress>,
}

impl WireMessage for AddrMessage {
    const COMMAND: Command = Command::Addr;

    fn encode_payload(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        CompactSize::from(self.addresses.len()).write(&mut w);
        for addr in &self.addresses {
            w.write_net_addr_with_time(addr);
        }
        w.into_bytes()
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        let mut r = ByteReader::new(payload);
        let count = CompactSize::read(&mut r)?.as_usize();
        if count > MAX_ADDR_ENTRIES {
            return Err(PeerError::protocol(format!(
                "addr message carries {count} entries, exceeding the {MAX_ADDR_ENTRIES} limit"
            )));
        }
        let mut addresses = Vec::with_capacity(count);
        for _ in 0..count {
            addresses.push(r.read_net_addr_with_time()?);
        }
        Ok(AddrMessage { addresses })
    }

    fn to_value(&self) -> SVal {
        SVal::Arr(
            self.addresses
                .iter()
                .map(|a| SVal::Str(a.addr.to_string()))
                .collect(),
        )
    }

    fn apply(&self, node: &Node, _peer: &mut Peer) -> PeerResult<()> {
        node.address_book.add(self.addresses.clone());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn addr_roundtrips() {
        let msg = AddrMessage {
            addresses: vec![
                NetworkAddress {
                    timestamp: Some(1_700_000_000),
                    services: 1,
                    addr: "1.2.3.4:8333".parse().unwrap(),
                },
                NetworkAddress {
                    timestamp: Some(1_700_000_001),
                    services: 0,
                    addr: "[::1]:8333".parse().unwrap(),
                },
            ],
        };
        assert_eq!(AddrMessage::decode_payload(&msg.encode_payload()).unwrap(), msg);
    }

    #[test]
    fn oversized_addr_count_is_rejected() {
        let mut w = ByteWriter::new();
        CompactSize::from(MAX_ADDR_ENTRIES + 1).write(&mut w);
        assert!(AddrMessage::decode_payload(&w.into_bytes()).is_err());
    }

    #[test]
    fn getaddr_apply_enqueues_a_sample() {
        let node = crate::node::test_support::plain_node();
        node.address_book.add(vec![NetworkAddress {
            timestamp: None,
            services: 1,
            addr: "9.9.9.9:8333".parse().unwrap(),
        }]);
        let mut peer = Peer::new("127.0.0.1:1".parse().unwrap(), true, node.self_nonce);
        GetAddrMessage.apply(&node, &mut peer).unwrap();
        assert!(peer.has_outbound());
    }
}
