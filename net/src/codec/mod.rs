pub mod frame;
pub mod primitives;
pub mod tlv;
pub mod varint;

pub use frame::{sha256, sha256d, MAX_PAYLOAD};
pub use primitives::{ByteReader, ByteWriter, Hash256, InventoryType, InventoryVector, NetworkAddress};
pub use varint::CompactSize;
