//! `verack` — empty-payload acknowledgement of a received `version`.

use crate::codec::tlv::SVal;
use crate::error::PeerResult;
use crate::messages::{no_payload, require_empty, Command, WireMessage};
use crate::node::{Node, Peer};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerackMessage;

impl WireMessage for VerackMessage {
    const COMMAND: Command = Command::Verack;

    fn encode_payload(&self) -> Vec<u8> {
        no_payload()
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        require_empty(payload)?;
        Ok(VerackMessage)
    }

    fn to_value(&self) -> SVal {
        SVal::Null
    }

    fn apply(&self, _node: &Node, peer: &mut Peer) -> PeerResult<()> {
        peer.mark_verack_received();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_payload_roundtrips() {
        assert_eq!(VerackMessage::decode_payload(&VerackMessage.encode_payload()).unwrap(), VerackMessage);
    }

    #[test]
    fn nonempty_payload_is_rejected() {
        assert!(VerackMessage::decode_payload(&[1]).is_err());
    }
}
