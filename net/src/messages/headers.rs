//! `headers`/`getheaders`/`getblocks` — block-header sync. Header/chain
//! validation is out of scope (spec.md §1: "blockchain data model and
//! validation"); this layer only (de)serializes the wire shapes and hands
//! off through [`crate::hooks::Blockchain`], which has no chain-ordering
//! API, so the locator-driven replies here are honestly empty rather than
//! faking chain knowledge this core doesn't have.

use crate::codec::tlv::{SObjBuilder, SVal};
use crate::codec::varint::CompactSize;
use crate::codec::{ByteReader, ByteWriter, Hash256};
use crate::error::PeerResult;
use crate::messages::{Command, ProtocolMessage, WireMessage};
use crate::node::{Node, Peer};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHeaderEntry {
    pub version: i32,
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeaderEntry {
    /// The block identity hash: double-SHA256 of the fixed 80-byte header
    /// fields, excluding the trailing `txn_count` that only appears when a
    /// header is serialized inside a `headers` message.
    pub fn block_hash(&self) -> Hash256 {
        let mut w = ByteWriter::new();
        w.write_i32_le(self.version);
        w.write_hash(&self.prev_block);
        w.write_hash(&self.merkle_root);
        w.write_u32_le(self.timestamp);
        w.write_u32_le(self.bits);
        w.write_u32_le(self.nonce);
        Hash256::from_payload(&w.into_bytes())
    }

    fn write(&self, w: &mut ByteWriter) {
        w.write_i32_le(self.version);
        w.write_hash(&self.prev_block);
        w.write_hash(&self.merkle_root);
        w.write_u32_le(self.timestamp);
        w.write_u32_le(self.bits);
        w.write_u32_le(self.nonce);
        // trailing txn_count, always 0 on the wire for a headers-only entry
        CompactSize(0).write(w);
    }

    fn read(r: &mut ByteReader) -> PeerResult<Self> {
        let entry = BlockHeaderEntry {
            version: r.read_i32_le()?,
            prev_block: r.read_hash()?,
            merkle_root: r.read_hash()?,
            timestamp: r.read_u32_le()?,
            bits: r.read_u32_le()?,
            nonce: r.read_u32_le()?,
        };
        CompactSize::read(r)?;
        Ok(entry)
    }
}

fn read_locator(r: &mut ByteReader) -> PeerResult<(i32, Vec<Hash256>, Hash256)> {
    let version = r.read_i32_le()?;
    let count = CompactSize::read(r)?.as_usize();
    let mut locator_hashes = Vec::with_capacity(count);
    for _ in 0..count {
        locator_hashes.push(r.read_hash()?);
    }
    let stop_hash = r.read_hash()?;
    Ok((version, locator_hashes, stop_hash))
}

fn write_locator(w: &mut ByteWriter, version: i32, locator_hashes: &[Hash256], stop_hash: &Hash256) {
    w.write_i32_le(version);
    CompactSize::from(locator_hashes.len()).write(w);
    for hash in locator_hashes {
        w.write_hash(hash);
    }
    w.write_hash(stop_hash);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetHeadersMessage {
    pub version: i32,
    pub locator_hashes: Vec<Hash256>,
    pub stop_hash: Hash256,
}

impl WireMessage for GetHeadersMessage {
    const COMMAND: Command = Command::GetHeaders;

    fn encode_payload(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        write_locator(&mut w, self.version, &self.locator_hashes, &self.stop_hash);
        w.into_bytes()
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        let mut r = ByteReader::new(payload);
        let (version, locator_hashes, stop_hash) = read_locator(&mut r)?;
        Ok(GetHeadersMessage { version, locator_hashes, stop_hash })
    }

    fn to_value(&self) -> SVal {
        SObjBuilder::new().with("locator_len", self.locator_hashes.len() as i64).build()
    }

    fn apply(&self, _node: &Node, peer: &mut Peer) -> PeerResult<()> {
        peer.enqueue(ProtocolMessage::Headers(HeadersMessage { headers: Vec::new() }));
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetBlocksMessage {
    pub version: i32,
    pub locator_hashes: Vec<Hash256>,
    pub stop_hash: Hash256,
}

impl WireMessage for GetBlocksMessage {
    const COMMAND: Command = Command::GetBlocks;

    fn encode_payload(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        write_locator(&mut w, self.version, &self.locator_hashes, &self.stop_hash);
        w.into_bytes()
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        let mut r = ByteReader::new(payload);
        let (version, locator_hashes, stop_hash) = read_locator(&mut r)?;
        Ok(GetBlocksMessage { version, locator_hashes, stop_hash })
    }

    fn to_value(&self) -> SVal {
        SObjBuilder::new().with("locator_len", self.locator_hashes.len() as i64).build()
    }

    fn apply(&self, _node: &Node, peer: &mut Peer) -> PeerResult<()> {
        peer.enqueue(ProtocolMessage::Inv(crate::messages::InvMessage { items: Vec::new() }));
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadersMessage {
    pub headers: Vec<BlockHeaderEntry>,
}

impl WireMessage for HeadersMessage {
    const COMMAND: Command = Command::Headers;

    fn encode_payload(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        CompactSize::from(self.headers.len()).write(&mut w);
        for header in &self.headers {
            header.write(&mut w);
        }
        w.into_bytes()
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        let mut r = ByteReader::new(payload);
        let count = CompactSize::read(&mut r)?.as_usize();
        let mut headers = Vec::with_capacity(count);
        for _ in 0..count {
            headers.push(BlockHeaderEntry::read(&mut r)?);
        }
        Ok(HeadersMessage { headers })
    }

    fn to_value(&self) -> SVal {
        SObjBuilder::new().with("count", self.headers.len() as i64).build()
    }

    fn apply(&self, _node: &Node, _peer: &mut Peer) -> PeerResult<()> {
        // Header-chain validation and continuation sync are out of scope;
        // the protocol core's job ends at handing a decoded batch back.
        Ok(())
    }
}
