//! The wire envelope: `magic | command | length | checksum | payload`.
//! Parsing is incremental — [`try_parse`] never errors on a partial frame,
//! it reports [`FrameParseOutcome::NeedMore`] and waits for more bytes.

use sha2::digest::FixedOutput;
use sha2::{Digest, Sha256};

use crate::error::{PeerError, PeerResult};

/// Payload byte count ceiling from the external-interfaces contract.
pub const MAX_PAYLOAD: usize = 32 * 1024 * 1024;

const MAGIC_LEN: usize = 4;
const COMMAND_LEN: usize = 12;
const LENGTH_LEN: usize = 4;
const CHECKSUM_LEN: usize = 4;
const HEADER_LEN: usize = MAGIC_LEN + COMMAND_LEN + LENGTH_LEN + CHECKSUM_LEN;

/// One parsed wire frame, prior to being resolved against the message
/// registry. `command` is the raw, NUL-trimmed ASCII command string.
#[derive(Debug)]
pub struct RawFrame {
    pub magic: u32,
    pub command: String,
    pub payload: Vec<u8>,
}

pub enum FrameParseOutcome {
    Frame { frame: RawFrame, consumed: usize },
    NeedMore,
}

/// Attempts to parse exactly one frame from the front of `buf`. Returns the
/// frame plus the number of bytes it consumed, or `NeedMore` if `buf` does
/// not yet hold a complete frame. Never panics on truncated input.
/// `max_payload` is the deployment's configured ceiling (`limits.max_payload`,
/// defaulting to [`MAX_PAYLOAD`]); a declared length above it is rejected
/// before any attempt to wait for that many bytes.
pub fn try_parse(buf: &[u8], expected_magic: u32, max_payload: usize) -> PeerResult<FrameParseOutcome> {
    if buf.len() < HEADER_LEN {
        return Ok(FrameParseOutcome::NeedMore);
    }

    let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    if magic != expected_magic {
        return Err(PeerError::protocol(format!(
            "unexpected magic {magic:#010x}, expected {expected_magic:#010x}"
        )));
    }

    let command_bytes = &buf[4..16];
    let length = u32::from_le_bytes(buf[16..20].try_into().unwrap()) as usize;
    if length > max_payload {
        return Err(PeerError::protocol(format!(
            "payload length {length} exceeds configured max_payload ({max_payload})"
        )));
    }
    let checksum = &buf[20..24];

    if buf.len() < HEADER_LEN + length {
        return Ok(FrameParseOutcome::NeedMore);
    }

    let payload = buf[HEADER_LEN..HEADER_LEN + length].to_vec();
    verify_checksum(&payload, checksum)?;

    let command = parse_command(command_bytes)?;

    Ok(FrameParseOutcome::Frame {
        frame: RawFrame {
            magic,
            command,
            payload,
        },
        consumed: HEADER_LEN + length,
    })
}

/// Serializes a full frame: envelope plus payload.
pub fn encode(magic: u32, command: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&magic.to_le_bytes());
    out.extend_from_slice(&command_bytes(command));
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    let checksum = sha256d(payload);
    out.extend_from_slice(&checksum[..CHECKSUM_LEN]);
    out.extend_from_slice(payload);
    out
}

fn command_bytes(command: &str) -> [u8; COMMAND_LEN] {
    let mut out = [0u8; COMMAND_LEN];
    let bytes = command.as_bytes();
    debug_assert!(bytes.len() <= COMMAND_LEN, "command '{command}' too long");
    out[..bytes.len()].copy_from_slice(bytes);
    out
}

fn parse_command(bytes: &[u8]) -> PeerResult<String> {
    let nul_pos = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let (name, padding) = bytes.split_at(nul_pos);
    if padding.iter().any(|&b| b != 0) {
        return Err(PeerError::protocol("non-NUL padding in command field"));
    }
    if !name.iter().all(|&b| b.is_ascii_graphic()) {
        return Err(PeerError::protocol("non-ASCII byte in command field"));
    }
    Ok(String::from_utf8_lossy(name).into_owned())
}

fn verify_checksum(payload: &[u8], checksum: &[u8]) -> PeerResult<()> {
    if checksum == &sha256d(payload)[..CHECKSUM_LEN] {
        Ok(())
    } else {
        Err(PeerError::protocol("checksum mismatch"))
    }
}

pub fn sha256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::default();
    hasher.update(input);
    hasher.finalize_fixed().into()
}

pub fn sha256d(input: &[u8]) -> [u8; 32] {
    sha256(&sha256(input))
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;
    use rstest::*;

    const MAGIC: u32 = 0xDAB5_BFFA;

    #[rstest]
    #[case(b"", &hex!("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"))]
    #[case(b"abc", &hex!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"))]
    fn test_sha256(#[case] input: &[u8], #[case] expected: &[u8]) {
        assert_eq!(&sha256(input), expected);
    }

    #[test]
    fn encode_then_parse_recovers_command_and_payload() {
        let bytes = encode(MAGIC, "version", b"abc");
        match try_parse(&bytes, MAGIC, MAX_PAYLOAD).unwrap() {
            FrameParseOutcome::Frame { frame, consumed } => {
                assert_eq!(frame.command, "version");
                assert_eq!(frame.payload, b"abc");
                assert_eq!(consumed, bytes.len());
            }
            FrameParseOutcome::NeedMore => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn truncated_header_is_need_more_not_error() {
        let bytes = encode(MAGIC, "verack", &[]);
        for split in 0..HEADER_LEN {
            match try_parse(&bytes[..split], MAGIC, MAX_PAYLOAD).unwrap() {
                FrameParseOutcome::NeedMore => {}
                FrameParseOutcome::Frame { .. } => panic!("should not parse at split {split}"),
            }
        }
    }

    #[test]
    fn truncated_payload_is_need_more() {
        let bytes = encode(MAGIC, "ping", &8u64.to_le_bytes());
        match try_parse(&bytes[..bytes.len() - 1], MAGIC, MAX_PAYLOAD).unwrap() {
            FrameParseOutcome::NeedMore => {}
            FrameParseOutcome::Frame { .. } => panic!("should not parse a truncated payload"),
        }
    }

    #[test]
    fn corrupted_checksum_is_protocol_error() {
        let mut bytes = encode(MAGIC, "ping", &8u64.to_le_bytes());
        bytes[20] ^= 1;
        assert!(try_parse(&bytes, MAGIC, MAX_PAYLOAD).is_err());
    }

    #[test]
    fn oversized_length_is_rejected_without_waiting_for_bytes() {
        let mut bytes = encode(MAGIC, "ping", &[]);
        bytes[16..20].copy_from_slice(&((MAX_PAYLOAD + 1) as u32).to_le_bytes());
        assert!(try_parse(&bytes, MAGIC, MAX_PAYLOAD).is_err());
    }

    #[test]
    fn a_tighter_configured_max_payload_rejects_frames_the_hard_ceiling_would_accept() {
        let bytes = encode(MAGIC, "ping", &[0u8; 64]);
        assert!(matches!(try_parse(&bytes, MAGIC, MAX_PAYLOAD).unwrap(), FrameParseOutcome::Frame { .. }));
        assert!(try_parse(&bytes, MAGIC, 32).is_err(), "configured limit below the declared length must reject");
    }

    #[test]
    fn wrong_magic_is_protocol_error() {
        let bytes = encode(MAGIC, "verack", &[]);
        assert!(try_parse(&bytes, 0x1122_3344, MAX_PAYLOAD).is_err());
    }

    #[test]
    fn incremental_parsing_matches_split_or_whole() {
        let a = encode(MAGIC, "verack", &[]);
        let b = encode(MAGIC, "ping", &1u64.to_le_bytes());
        let mut combined = a.clone();
        combined.extend_from_slice(&b);

        let first = match try_parse(&combined, MAGIC, MAX_PAYLOAD).unwrap() {
            FrameParseOutcome::Frame { frame, consumed } => {
                assert_eq!(frame.command, "verack");
                consumed
            }
            FrameParseOutcome::NeedMore => panic!(),
        };
        assert_eq!(first, a.len());

        match try_parse(&combined[first..], MAGIC, MAX_PAYLOAD).unwrap() {
            FrameParseOutcome::Frame { frame, .. } => assert_eq!(frame.command, "ping"),
            FrameParseOutcome::NeedMore => panic!(),
        }
    }

    #[test]
    fn non_nul_padding_after_command_name_is_rejected() {
        let mut bytes = encode(MAGIC, "ping", &[]);
        bytes[8] = b'x'; // byte after "ping" NUL terminator inside the 12-byte window
        assert!(try_parse(&bytes, MAGIC, MAX_PAYLOAD).is_err());
    }
}
