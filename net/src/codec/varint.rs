//! CompactSize ("varint") and var-string encoding, per the wire contract:
//! a 1-byte prefix `<= 0xFC` is the value itself; `0xFD` is followed by a
//! little-endian `u16`; `0xFE` by a little-endian `u32`; `0xFF` by a
//! little-endian `u64`.

use crate::codec::primitives::{ByteReader, ByteWriter};
use crate::error::PeerResult;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CompactSize(pub u64);

impl CompactSize {
    pub fn read(r: &mut ByteReader) -> PeerResult<Self> {
        let prefix = r.read_u8()?;
        let value = match prefix {
            0xFD => r.read_u16_le()? as u64,
            0xFE => r.read_u32_le()? as u64,
            0xFF => r.read_u64_le()?,
            n => n as u64,
        };
        Ok(CompactSize(value))
    }

    pub fn write(&self, w: &mut ByteWriter) {
        match self.0 {
            n if n <= 0xFC => w.write_u8(n as u8),
            n if n <= 0xFFFF => {
                w.write_u8(0xFD);
                w.write_u16_le(n as u16);
            }
            n if n <= 0xFFFF_FFFF => {
                w.write_u8(0xFE);
                w.write_u32_le(n as u32);
            }
            n => {
                w.write_u8(0xFF);
                w.write_u64_le(n);
            }
        }
    }

    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for CompactSize {
    fn from(v: usize) -> Self {
        CompactSize(v as u64)
    }
}

pub fn read_var_string(r: &mut ByteReader) -> PeerResult<String> {
    let len = CompactSize::read(r)?.as_usize();
    let bytes = r.read(len)?.to_vec();
    String::from_utf8(bytes).map_err(|e| crate::error::PeerError::protocol(e.to_string()))
}

pub fn write_var_string(w: &mut ByteWriter, s: &str) {
    CompactSize::from(s.len()).write(w);
    w.write(s.as_bytes());
}

#[cfg(test)]
mod test {
    use super::*;

    fn roundtrip(value: u64) -> u64 {
        let mut w = ByteWriter::new();
        CompactSize(value).write(&mut w);
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        CompactSize::read(&mut r).unwrap().0
    }

    #[test]
    fn roundtrips_boundary_values() {
        for v in [0, 1, 0xFC, 0xFD, 0xFFFF, 0x1_0000, 0xFFFF_FFFF, 0x1_0000_0000, u64::MAX] {
            assert_eq!(roundtrip(v), v, "failed for {v}");
        }
    }

    #[test]
    fn encodes_small_values_as_single_byte() {
        let mut w = ByteWriter::new();
        CompactSize(0xFC).write(&mut w);
        assert_eq!(w.into_bytes(), vec![0xFC]);
    }

    #[test]
    fn var_string_roundtrips() {
        let mut w = ByteWriter::new();
        write_var_string(&mut w, "/rust-p2p-node:0.1/");
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(read_var_string(&mut r).unwrap(), "/rust-p2p-node:0.1/");
    }

    #[test]
    fn empty_var_string_roundtrips() {
        let mut w = ByteWriter::new();
        write_var_string(&mut w, "");
        let bytes = w.into_bytes();
        assert_eq!(bytes, vec![0]);
    }
}
