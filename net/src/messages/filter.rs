//! `filterload`/`filteradd`/`filterclear`/`merkleblock` — BIP 37 bloom
//! filtering. Matching a filter against real transactions is out of scope
//! (spec.md §1 excludes transaction/block validation internals); this
//! layer (de)serializes the wire shapes and tracks on/off state on the
//! peer so a future relay stage can consult it.

use crate::codec::tlv::{SObjBuilder, SVal};
use crate::codec::varint::CompactSize;
use crate::codec::{ByteReader, ByteWriter, Hash256};
use crate::error::PeerResult;
use crate::messages::{no_payload, require_empty, BlockHeaderEntry, Command, WireMessage};
use crate::node::{Node, Peer};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterLoadMessage {
    pub filter: Vec<u8>,
    pub hash_funcs: u32,
    pub tweak: u32,
    pub flags: u8,
}

impl WireMessage for FilterLoadMessage {
    const COMMAND: Command = Command::FilterLoad;

    fn encode_payload(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        CompactSize::from(self.filter.len()).write(&mut w);
        w.write(&self.filter);
        w.write_u32_le(self.hash_funcs);
        w.write_u32_le(self.tweak);
        w.write_u8(self.flags);
        w.into_bytes()
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        let mut r = ByteReader::new(payload);
        let len = CompactSize::read(&mut r)?.as_usize();
        let filter = r.read(len)?.to_vec();
        let hash_funcs = r.read_u32_le()?;
        let tweak = r.read_u32_le()?;
        let flags = r.read_u8()?;
        Ok(FilterLoadMessage { filter, hash_funcs, tweak, flags })
    }

    fn to_value(&self) -> SVal {
        SObjBuilder::new().with("filter_bytes", self.filter.len() as i64).build()
    }

    fn apply(&self, _node: &Node, peer: &mut Peer) -> PeerResult<()> {
        peer.bloom_filter_active = true;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterAddMessage {
    pub data: Vec<u8>,
}

impl WireMessage for FilterAddMessage {
    const COMMAND: Command = Command::FilterAdd;

    fn encode_payload(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        CompactSize::from(self.data.len()).write(&mut w);
        w.write(&self.data);
        w.into_bytes()
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        let mut r = ByteReader::new(payload);
        let len = CompactSize::read(&mut r)?.as_usize();
        Ok(FilterAddMessage { data: r.read(len)?.to_vec() })
    }

    fn to_value(&self) -> SVal {
        SObjBuilder::new().with("data_bytes", self.data.len() as i64).build()
    }

    fn apply(&self, _node: &Node, peer: &mut Peer) -> PeerResult<()> {
        if !peer.bloom_filter_active {
            return Err(crate::error::PeerError::protocol("filteradd without an active filterload"));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterClearMessage;

impl WireMessage for FilterClearMessage {
    const COMMAND: Command = Command::FilterClear;

    fn encode_payload(&self) -> Vec<u8> {
        no_payload()
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        require_empty(payload)?;
        Ok(FilterClearMessage)
    }

    fn to_value(&self) -> SVal {
        SVal::Null
    }

    fn apply(&self, _node: &Node, peer: &mut Peer) -> PeerResult<()> {
        peer.bloom_filter_active = false;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleBlockMessage {
    pub header: BlockHeaderEntry,
    pub total_transactions: u32,
    pub hashes: Vec<Hash256>,
    pub flags: Vec<u8>,
}

impl WireMessage for MerkleBlockMessage {
    const COMMAND: Command = Command::MerkleBlock;

    fn encode_payload(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_i32_le(self.header.version);
        w.write_hash(&self.header.prev_block);
        w.write_hash(&self.header.merkle_root);
        w.write_u32_le(self.header.timestamp);
        w.write_u32_le(self.header.bits);
        w.write_u32_le(self.header.nonce);
        w.write_u32_le(self.total_transactions);
        CompactSize::from(self.hashes.len()).write(&mut w);
        for hash in &self.hashes {
            w.write_hash(hash);
        }
        CompactSize::from(self.flags.len()).write(&mut w);
        w.write(&self.flags);
        w.into_bytes()
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        let mut r = ByteReader::new(payload);
        let header = BlockHeaderEntry {
            version: r.read_i32_le()?,
            prev_block: r.read_hash()?,
            merkle_root: r.read_hash()?,
            timestamp: r.read_u32_le()?,
            bits: r.read_u32_le()?,
            nonce: r.read_u32_le()?,
        };
        let total_transactions = r.read_u32_le()?;
        let hash_count = CompactSize::read(&mut r)?.as_usize();
        let mut hashes = Vec::with_capacity(hash_count);
        for _ in 0..hash_count {
            hashes.push(r.read_hash()?);
        }
        let flag_len = CompactSize::read(&mut r)?.as_usize();
        let flags = r.read(flag_len)?.to_vec();
        Ok(MerkleBlockMessage { header, total_transactions, hashes, flags })
    }

    fn to_value(&self) -> SVal {
        SObjBuilder::new()
            .with("total_transactions", self.total_transactions as i64)
            .with("hash_count", self.hashes.len() as i64)
            .build()
    }

    fn apply(&self, _node: &Node, _peer: &mut Peer) -> PeerResult<()> {
        // Partial-merkle-tree matching is out of scope; decoding it
        // correctly is the protocol core's job, consuming it is the
        // wallet layer's.
        Ok(())
    }
}
