//! Cursor-based byte reader/writer plus the fixed-size wire primitives:
//! hashes, network addresses and inventory vectors. Generalizes the
//! teacher's `ByteBufferParser`/`ByteBufferComposer` (which only covered the
//! subset needed for `version`) to the full primitive set this protocol
//! core requires.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use strum::{EnumIter, IntoEnumIterator};

use crate::error::{PeerError, PeerResult};

pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        ByteReader { buf, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn eof_check(&self, want: usize) -> PeerResult<()> {
        if self.remaining() < want {
            Err(PeerError::protocol(format!(
                "unexpected end of buffer: wanted {want} bytes, {} remaining",
                self.remaining()
            )))
        } else {
            Ok(())
        }
    }

    pub fn skip(&mut self, count: usize) -> PeerResult<()> {
        self.eof_check(count)?;
        self.pos += count;
        Ok(())
    }

    pub fn read(&mut self, size: usize) -> PeerResult<&'a [u8]> {
        self.eof_check(size)?;
        let range = self.pos..self.pos + size;
        self.pos += size;
        Ok(&self.buf[range])
    }

    pub fn read_u8(&mut self) -> PeerResult<u8> {
        Ok(self.read(1)?[0])
    }

    pub fn read_bool(&mut self) -> PeerResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16_le(&mut self) -> PeerResult<u16> {
        Ok(u16::from_le_bytes(self.read(2)?.try_into().unwrap()))
    }

    pub fn read_u16_be(&mut self) -> PeerResult<u16> {
        Ok(u16::from_be_bytes(self.read(2)?.try_into().unwrap()))
    }

    pub fn read_u32_le(&mut self) -> PeerResult<u32> {
        Ok(u32::from_le_bytes(self.read(4)?.try_into().unwrap()))
    }

    pub fn read_i32_le(&mut self) -> PeerResult<i32> {
        Ok(i32::from_le_bytes(self.read(4)?.try_into().unwrap()))
    }

    pub fn read_u64_le(&mut self) -> PeerResult<u64> {
        Ok(u64::from_le_bytes(self.read(8)?.try_into().unwrap()))
    }

    pub fn read_i64_le(&mut self) -> PeerResult<i64> {
        Ok(i64::from_le_bytes(self.read(8)?.try_into().unwrap()))
    }

    pub fn read_hash(&mut self) -> PeerResult<Hash256> {
        let bytes: [u8; 32] = self.read(32)?.try_into().unwrap();
        Ok(Hash256(bytes))
    }

    pub fn read_net_addr(&mut self) -> PeerResult<NetworkAddress> {
        let services = self.read_u64_le()?;
        let ip_bytes: [u8; 16] = self.read(16)?.try_into().unwrap();
        let ip = IpAddr::from(ip_bytes);
        let port = self.read_u16_be()?;
        Ok(NetworkAddress {
            timestamp: None,
            services,
            addr: SocketAddr::new(ip, port),
        })
    }

    pub fn read_net_addr_with_time(&mut self) -> PeerResult<NetworkAddress> {
        let timestamp = self.read_u32_le()?;
        let mut addr = self.read_net_addr()?;
        addr.timestamp = Some(timestamp);
        Ok(addr)
    }

    pub fn read_inv_vector(&mut self) -> PeerResult<InventoryVector> {
        let kind = InventoryType::from_u32(self.read_u32_le()?);
        let hash = self.read_hash()?;
        Ok(InventoryVector { kind, hash })
    }
}

pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        ByteWriter { buf: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(v as u8);
    }

    pub fn write_u16_le(&mut self, v: u16) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_u16_be(&mut self, v: u16) {
        self.write(&v.to_be_bytes());
    }

    pub fn write_u32_le(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_i32_le(&mut self, v: i32) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_u64_le(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_i64_le(&mut self, v: i64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_hash(&mut self, hash: &Hash256) {
        self.write(&hash.0);
    }

    pub fn write_net_addr(&mut self, addr: &NetworkAddress) {
        self.write_u64_le(addr.services);
        let ipv6_octets = match addr.addr.ip() {
            IpAddr::V4(ip) => ip.to_ipv6_mapped().octets(),
            IpAddr::V6(ip) => ip.octets(),
        };
        self.write(&ipv6_octets);
        self.write_u16_be(addr.addr.port());
    }

    pub fn write_net_addr_with_time(&mut self, addr: &NetworkAddress) {
        self.write_u32_le(addr.timestamp.unwrap_or(0));
        self.write_net_addr(addr);
    }

    pub fn write_inv_vector(&mut self, inv: &InventoryVector) {
        self.write_u32_le(inv.kind.as_u32());
        self.write_hash(&inv.hash);
    }
}

impl Default for ByteWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// A 32-byte double-SHA256 content hash. Wire order is little-endian; the
/// textual (`Display`) form is the reversed-byte hex string conventionally
/// used to print block/tx ids.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    pub fn from_payload(payload: &[u8]) -> Self {
        Hash256(crate::codec::frame::sha256d(payload))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter().rev() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter)]
pub enum InventoryType {
    Error,
    MsgTx,
    MsgBlock,
    MsgFilteredBlock,
    MsgCmpctBlock,
    Unknown(u32),
}

impl InventoryType {
    pub fn as_u32(&self) -> u32 {
        match self {
            InventoryType::Error => 0,
            InventoryType::MsgTx => 1,
            InventoryType::MsgBlock => 2,
            InventoryType::MsgFilteredBlock => 3,
            InventoryType::MsgCmpctBlock => 4,
            InventoryType::Unknown(n) => *n,
        }
    }

    pub fn from_u32(v: u32) -> Self {
        match v {
            0 => InventoryType::Error,
            1 => InventoryType::MsgTx,
            2 => InventoryType::MsgBlock,
            3 => InventoryType::MsgFilteredBlock,
            4 => InventoryType::MsgCmpctBlock,
            other => InventoryType::Unknown(other),
        }
    }
}

// Exercises EnumIter so the known, non-Unknown variants stay enumerable for
// future dispatch tables without hand-maintaining a parallel list.
fn _known_inventory_types() -> impl Iterator<Item = InventoryType> {
    InventoryType::iter().filter(|t| !matches!(t, InventoryType::Unknown(_)))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InventoryVector {
    pub kind: InventoryType,
    pub hash: Hash256,
}

/// A peer endpoint advert, as stored in the address book. `timestamp` is
/// absent for the fields embedded in `version` (which carries no time) and
/// present for entries carried in `addr` messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkAddress {
    pub timestamp: Option<u32>,
    pub services: u64,
    pub addr: SocketAddr,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hash_display_is_reversed_hex() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xAB;
        bytes[31] = 0xCD;
        let hash = Hash256(bytes);
        let text = format!("{hash}");
        assert!(text.starts_with("cd"));
        assert!(text.ends_with("ab"));
    }

    #[test]
    fn net_addr_roundtrips() {
        let addr = NetworkAddress {
            timestamp: None,
            services: 1,
            addr: "1.2.3.4:8333".parse().unwrap(),
        };
        let mut w = ByteWriter::new();
        w.write_net_addr(&addr);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 26);
        let mut r = ByteReader::new(&bytes);
        let decoded = r.read_net_addr().unwrap();
        assert_eq!(decoded.services, addr.services);
        assert_eq!(decoded.addr.port(), addr.addr.port());
    }

    #[test]
    fn inv_vector_roundtrips() {
        let inv = InventoryVector {
            kind: InventoryType::MsgTx,
            hash: Hash256([7u8; 32]),
        };
        let mut w = ByteWriter::new();
        w.write_inv_vector(&inv);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 36);
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_inv_vector().unwrap(), inv);
    }

    #[test]
    fn unknown_inventory_type_is_preserved_not_rejected() {
        let mut w = ByteWriter::new();
        w.write_inv_vector(&InventoryVector {
            kind: InventoryType::Unknown(99),
            hash: Hash256::ZERO,
        });
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        let inv = r.read_inv_vector().unwrap();
        assert_eq!(inv.kind, InventoryType::Unknown(99));
    }
}
