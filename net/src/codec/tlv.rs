//! Secondary, self-describing codec for internal/RPC payloads and for the
//! debug `to_value()` view of wire messages. Supplemented from
//! `TlvSerializer.hpp` / the `SVal` dynamic value type in the original
//! source: every value is tagged `type | length | bytes` so a decoder never
//! needs out-of-band schema knowledge.
//!
//! This is an alternate serializer behind the same decode/encode contract
//! as the wire frame codec (§4.1): it does not participate in frame
//! checksums or the `magic`/`command` envelope.

use std::collections::BTreeMap;

use crate::codec::primitives::{ByteReader, ByteWriter};
use crate::error::{PeerError, PeerResult};

/// A self-describing dynamic value, used for logging and RPC/TLV
/// round-trips — not for the protocol wire frame itself.
#[derive(Clone, Debug, PartialEq)]
pub enum SVal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bin(Vec<u8>),
    Arr(Vec<SVal>),
    Obj(BTreeMap<String, SVal>),
}

impl SVal {
    pub fn as_str(&self) -> PeerResult<&str> {
        match self {
            SVal::Str(s) => Ok(s),
            other => Err(wrong_variant("string", other)),
        }
    }

    pub fn as_int(&self) -> PeerResult<i64> {
        match self {
            SVal::Int(v) => Ok(*v),
            other => Err(wrong_variant("int", other)),
        }
    }

    pub fn as_bool(&self) -> PeerResult<bool> {
        match self {
            SVal::Bool(v) => Ok(*v),
            other => Err(wrong_variant("bool", other)),
        }
    }

    pub fn as_arr(&self) -> PeerResult<&[SVal]> {
        match self {
            SVal::Arr(v) => Ok(v),
            other => Err(wrong_variant("array", other)),
        }
    }

    pub fn as_obj(&self) -> PeerResult<&BTreeMap<String, SVal>> {
        match self {
            SVal::Obj(v) => Ok(v),
            other => Err(wrong_variant("object", other)),
        }
    }
}

fn wrong_variant(expected: &str, got: &SVal) -> PeerError {
    let tag = match got {
        SVal::Null => "null",
        SVal::Bool(_) => "bool",
        SVal::Int(_) => "int",
        SVal::Float(_) => "float",
        SVal::Str(_) => "string",
        SVal::Bin(_) => "binary",
        SVal::Arr(_) => "array",
        SVal::Obj(_) => "object",
    };
    PeerError::protocol(format!("expected {expected} value, got {tag}"))
}

impl From<&str> for SVal {
    fn from(v: &str) -> Self {
        SVal::Str(v.to_string())
    }
}

impl From<String> for SVal {
    fn from(v: String) -> Self {
        SVal::Str(v)
    }
}

impl From<i64> for SVal {
    fn from(v: i64) -> Self {
        SVal::Int(v)
    }
}

impl From<u64> for SVal {
    fn from(v: u64) -> Self {
        SVal::Int(v as i64)
    }
}

impl From<bool> for SVal {
    fn from(v: bool) -> Self {
        SVal::Bool(v)
    }
}

#[repr(u8)]
enum Tag {
    Null = 0,
    Bool = 1,
    Int = 2,
    Float = 3,
    Str = 4,
    Bin = 5,
    Arr = 6,
    Obj = 7,
}

impl Tag {
    fn from_u8(v: u8) -> PeerResult<Self> {
        Ok(match v {
            0 => Tag::Null,
            1 => Tag::Bool,
            2 => Tag::Int,
            3 => Tag::Float,
            4 => Tag::Str,
            5 => Tag::Bin,
            6 => Tag::Arr,
            7 => Tag::Obj,
            other => return Err(PeerError::protocol(format!("unknown TLV tag {other}"))),
        })
    }
}

/// Encodes a value as `tag(1) | length(4, LE) | body`, where `length` is the
/// byte length of `body` (elements, for arrays/objects; encoded value
/// bytes, for everything else).
pub fn encode(value: &SVal) -> Vec<u8> {
    let mut w = ByteWriter::new();
    encode_value(&mut w, value);
    w.into_bytes()
}

pub fn decode(bytes: &[u8]) -> PeerResult<SVal> {
    let mut r = ByteReader::new(bytes);
    decode_value(&mut r)
}

fn encode_value(w: &mut ByteWriter, value: &SVal) {
    match value {
        SVal::Null => w.write_u8(Tag::Null as u8),
        SVal::Bool(b) => {
            w.write_u8(Tag::Bool as u8);
            w.write_bool(*b);
        }
        SVal::Int(i) => {
            w.write_u8(Tag::Int as u8);
            w.write_i64_le(*i);
        }
        SVal::Float(f) => {
            w.write_u8(Tag::Float as u8);
            w.write(&f.to_le_bytes());
        }
        SVal::Str(s) => {
            w.write_u8(Tag::Str as u8);
            w.write_u32_le(s.len() as u32);
            w.write(s.as_bytes());
        }
        SVal::Bin(b) => {
            w.write_u8(Tag::Bin as u8);
            w.write_u32_le(b.len() as u32);
            w.write(b);
        }
        SVal::Arr(items) => {
            w.write_u8(Tag::Arr as u8);
            w.write_u32_le(items.len() as u32);
            for item in items {
                encode_value(w, item);
            }
        }
        SVal::Obj(map) => {
            w.write_u8(Tag::Obj as u8);
            w.write_u32_le(map.len() as u32);
            for (key, val) in map {
                w.write_u32_le(key.len() as u32);
                w.write(key.as_bytes());
                encode_value(w, val);
            }
        }
    }
}

fn decode_value(r: &mut ByteReader) -> PeerResult<SVal> {
    match Tag::from_u8(r.read_u8()?)? {
        Tag::Null => Ok(SVal::Null),
        Tag::Bool => Ok(SVal::Bool(r.read_bool()?)),
        Tag::Int => Ok(SVal::Int(r.read_i64_le()?)),
        Tag::Float => {
            let bytes: [u8; 8] = r.read(8)?.try_into().unwrap();
            Ok(SVal::Float(f64::from_le_bytes(bytes)))
        }
        Tag::Str => {
            let len = r.read_u32_le()? as usize;
            let bytes = r.read(len)?.to_vec();
            String::from_utf8(bytes)
                .map(SVal::Str)
                .map_err(|e| PeerError::protocol(e.to_string()))
        }
        Tag::Bin => {
            let len = r.read_u32_le()? as usize;
            Ok(SVal::Bin(r.read(len)?.to_vec()))
        }
        Tag::Arr => {
            let len = r.read_u32_le()? as usize;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(decode_value(r)?);
            }
            Ok(SVal::Arr(items))
        }
        Tag::Obj => {
            let len = r.read_u32_le()? as usize;
            let mut map = BTreeMap::new();
            for _ in 0..len {
                let key_len = r.read_u32_le()? as usize;
                let key = String::from_utf8(r.read(key_len)?.to_vec())
                    .map_err(|e| PeerError::protocol(e.to_string()))?;
                map.insert(key, decode_value(r)?);
            }
            Ok(SVal::Obj(map))
        }
    }
}

/// Small builder mirroring the source's `SObj` literal style (`obj.emplace(k, v)`).
#[derive(Default)]
pub struct SObjBuilder(BTreeMap<String, SVal>);

impl SObjBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<SVal>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> SVal {
        SVal::Obj(self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrips_scalar_values() {
        for v in [SVal::Null, SVal::Bool(true), SVal::Int(-7), SVal::Float(3.5), SVal::from("hi")] {
            assert_eq!(decode(&encode(&v)).unwrap(), v);
        }
    }

    #[test]
    fn roundtrips_nested_object() {
        let value = SObjBuilder::new()
            .with("command", "inv")
            .with("count", 2i64)
            .with(
                "items",
                SVal::Arr(vec![SVal::from("tx"), SVal::from("block")]),
            )
            .build();
        assert_eq!(decode(&encode(&value)).unwrap(), value);
    }

    #[test]
    fn typed_accessor_rejects_wrong_variant() {
        let value = SVal::Int(5);
        assert!(value.as_str().is_err());
        assert_eq!(value.as_int().unwrap(), 5);
    }

    #[test]
    fn decode_rejects_unknown_tag() {
        assert!(decode(&[0xFF]).is_err());
    }
}
