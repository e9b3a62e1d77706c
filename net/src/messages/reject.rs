//! `reject` — rejection notice for a `message`/`tx`/`block` this node
//! didn't accept. `data` is present only when rejecting a `tx` or `block`,
//! carrying that object's hash.

use crate::codec::tlv::{SObjBuilder, SVal};
use crate::codec::varint::{read_var_string, write_var_string};
use crate::codec::{ByteReader, ByteWriter, Hash256};
use crate::error::PeerResult;
use crate::messages::{Command, WireMessage};
use crate::node::{Node, Peer};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectMessage {
    pub message: String,
    pub code: u8,
    pub reason: String,
    pub data: Option<Hash256>,
}

impl WireMessage for RejectMessage {
    const COMMAND: Command = Command::Reject;

    fn encode_payload(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        write_var_string(&mut w, &self.message);
        w.write_u8(self.code);
        write_var_string(&mut w, &self.reason);
        if let Some(hash) = &self.data {
            w.write_hash(hash);
        }
        w.into_bytes()
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        let mut r = ByteReader::new(payload);
        let message = read_var_string(&mut r)?;
        let code = r.read_u8()?;
        let reason = read_var_string(&mut r)?;
        let data = if r.remaining() >= 32 { Some(r.read_hash()?) } else { None };
        Ok(RejectMessage { message, code, reason, data })
    }

    fn to_value(&self) -> SVal {
        SObjBuilder::new()
            .with("message", self.message.clone())
            .with("code", self.code as i64)
            .with("reason", self.reason.clone())
            .build()
    }

    fn apply(&self, _node: &Node, peer: &mut Peer) -> PeerResult<()> {
        log::warn!(
            "peer {} rejected '{}' (code {:#04x}): {}",
            peer.remote_addr,
            self.message,
            self.code,
            self.reason
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrips_without_data() {
        let msg = RejectMessage {
            message: "version".to_string(),
            code: 0x01,
            reason: "obsolete".to_string(),
            data: None,
        };
        assert_eq!(RejectMessage::decode_payload(&msg.encode_payload()).unwrap(), msg);
    }

    #[test]
    fn roundtrips_with_data_hash() {
        let msg = RejectMessage {
            message: "tx".to_string(),
            code: 0x42,
            reason: "dust".to_string(),
            data: Some(Hash256([3u8; 32])),
        };
        assert_eq!(RejectMessage::decode_payload(&msg.encode_payload()).unwrap(), msg);
    }
}
