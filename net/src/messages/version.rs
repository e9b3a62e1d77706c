//! `version` — the first message either side of a session sends. Carries
//! protocol/version negotiation, peer identity, and a nonce used to detect
//! self-connections. Grounded in
//! `original_source/src/protocol/messages/VersionMessage.{hpp,cpp}`.

use crate::codec::tlv::{SObjBuilder, SVal};
use crate::codec::varint::{read_var_string, write_var_string};
use crate::codec::{ByteReader, ByteWriter, NetworkAddress};
use crate::error::PeerResult;
use crate::messages::{Command, WireMessage};
use crate::node::{Node, Peer, RemoteVersion};

#[derive(Clone, Debug, PartialEq)]
pub struct VersionMessage {
    pub version: i32,
    pub services: u64,
    pub timestamp: i64,
    pub addr_recv: NetworkAddress,
    pub addr_from: NetworkAddress,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: i32,
    pub relay: bool,
}

impl WireMessage for VersionMessage {
    const COMMAND: Command = Command::Version;

    fn encode_payload(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_i32_le(self.version);
        w.write_u64_le(self.services);
        w.write_i64_le(self.timestamp);
        w.write_net_addr(&self.addr_recv);
        w.write_net_addr(&self.addr_from);
        w.write_u64_le(self.nonce);
        write_var_string(&mut w, &self.user_agent);
        w.write_i32_le(self.start_height);
        w.write_bool(self.relay);
        w.into_bytes()
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        let mut r = ByteReader::new(payload);
        let version = r.read_i32_le()?;
        let services = r.read_u64_le()?;
        let timestamp = r.read_i64_le()?;
        let addr_recv = r.read_net_addr()?;
        let addr_from = r.read_net_addr()?;
        let nonce = r.read_u64_le()?;
        let user_agent = read_var_string(&mut r)?;
        let start_height = r.read_i32_le()?;
        // Pre-BIP-0037 peers omit `relay`; default to true rather than
        // rejecting the frame for running a few bytes short.
        let relay = if r.remaining() > 0 { r.read_bool()? } else { true };
        Ok(VersionMessage {
            version,
            services,
            timestamp,
            addr_recv,
            addr_from,
            nonce,
            user_agent,
            start_height,
            relay,
        })
    }

    fn to_value(&self) -> SVal {
        SObjBuilder::new()
            .with("version", self.version as i64)
            .with("services", self.services as i64)
            .with("nonce", self.nonce as i64)
            .with("user_agent", self.user_agent.clone())
            .with("start_height", self.start_height as i64)
            .with("relay", self.relay)
            .build()
    }

    fn apply(&self, node: &Node, peer: &mut Peer) -> PeerResult<()> {
        if node.address_book.is_self_nonce(self.nonce) {
            peer.close("self-connection detected via matching version nonce");
            return Err(crate::error::PeerError::handshake("connected to self"));
        }

        peer.mark_version_received(RemoteVersion {
            protocol_version: self.version,
            services: self.services,
            nonce: self.nonce,
            user_agent: self.user_agent.clone(),
            start_height: self.start_height,
            relay: self.relay,
        })?;

        if !peer.state_has_sent_version() {
            let our_version = node.make_version(peer);
            peer.mark_version_sent();
            peer.enqueue(crate::messages::ProtocolMessage::Version(our_version));
        }

        if !peer.state_has_sent_verack() {
            peer.mark_verack_sent();
            peer.enqueue(crate::messages::ProtocolMessage::Verack(
                crate::messages::VerackMessage,
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::SocketAddr;

    fn sample() -> VersionMessage {
        VersionMessage {
            version: 70016,
            services: 1,
            timestamp: 1_700_000_000,
            addr_recv: NetworkAddress {
                timestamp: None,
                services: 0,
                addr: "1.2.3.4:8333".parse::<SocketAddr>().unwrap(),
            },
            addr_from: NetworkAddress {
                timestamp: None,
                services: 1,
                addr: "0.0.0.0:0".parse::<SocketAddr>().unwrap(),
            },
            nonce: 0xdead_beef_cafe_f00d,
            user_agent: "/rust-p2p-node:0.1/".to_string(),
            start_height: 42,
            relay: true,
        }
    }

    #[test]
    fn roundtrips_through_encode_decode() {
        let msg = sample();
        let decoded = VersionMessage::decode_payload(&msg.encode_payload()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn decode_accepts_missing_trailing_relay_flag() {
        let msg = sample();
        let mut bytes = msg.encode_payload();
        bytes.truncate(bytes.len() - 1);
        let decoded = VersionMessage::decode_payload(&bytes).unwrap();
        assert!(decoded.relay);
    }
}
