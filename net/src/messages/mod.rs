//! Typed message family. Per the "Polymorphic Message family" redesign
//! note (spec.md §9) this is a tagged sum type (`ProtocolMessage`) instead
//! of virtual dispatch; every variant implements the shared capability
//! surface through [`WireMessage`] and the registry maps a command string
//! to a decoder, never branching on the specific command itself.

mod addr;
mod compact;
mod filter;
mod headers;
mod inventory;
mod mempool;
mod ping_pong;
mod reject;
mod tx_block;
mod verack;
mod version;

pub use addr::{AddrMessage, GetAddrMessage};
pub use compact::{BlockTxnMessage, CmpctBlockMessage, GetBlockTxnMessage, PrefilledTransaction, SendCmpctMessage};
pub use filter::{FilterAddMessage, FilterClearMessage, FilterLoadMessage, MerkleBlockMessage};
pub use headers::{BlockHeaderEntry, GetBlocksMessage, GetHeadersMessage, HeadersMessage};
pub use inventory::{GetDataMessage, InvMessage, NotFoundMessage};
pub use mempool::{FeeFilterMessage, MemPoolMessage, SendHeadersMessage};
pub use ping_pong::{PingMessage, PongMessage};
pub use reject::RejectMessage;
pub use tx_block::{BlockMessage, TxMessage};
pub use verack::VerackMessage;
pub use version::VersionMessage;

use strum::{EnumIter, IntoEnumIterator};

use crate::codec::ByteWriter;
use crate::codec::tlv::SVal;
use crate::error::{PeerError, PeerResult};
use crate::node::{Node, Peer};

/// The capability surface every message variant implements: (de)serialize
/// itself, render a structured debug/RPC view, and apply its effect to the
/// node/peer pair. Mirrors `Message::{Serialize, Unserialize, toSVal,
/// apply}` from the source this spec was distilled from.
pub trait WireMessage: Sized {
    const COMMAND: Command;

    fn encode_payload(&self) -> Vec<u8>;
    fn decode_payload(payload: &[u8]) -> PeerResult<Self>;
    fn to_value(&self) -> SVal;

    /// Mutates peer/node state and may enqueue outbound messages on `peer`.
    fn apply(&self, node: &Node, peer: &mut Peer) -> PeerResult<()>;
}

/// The 26 commands the core supports (spec.md §4.2). Each maps to a fixed
/// 12-byte ASCII, NUL-padded wire command string.
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter)]
pub enum Command {
    Version,
    Verack,
    Ping,
    Pong,
    GetAddr,
    Addr,
    Inv,
    GetData,
    NotFound,
    Tx,
    Block,
    Headers,
    GetHeaders,
    GetBlocks,
    MemPool,
    FeeFilter,
    SendHeaders,
    SendCmpct,
    CmpctBlock,
    GetBlockTxn,
    BlockTxn,
    FilterLoad,
    FilterAdd,
    FilterClear,
    MerkleBlock,
    Reject,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Version => "version",
            Command::Verack => "verack",
            Command::Ping => "ping",
            Command::Pong => "pong",
            Command::GetAddr => "getaddr",
            Command::Addr => "addr",
            Command::Inv => "inv",
            Command::GetData => "getdata",
            Command::NotFound => "notfound",
            Command::Tx => "tx",
            Command::Block => "block",
            Command::Headers => "headers",
            Command::GetHeaders => "getheaders",
            Command::GetBlocks => "getblocks",
            Command::MemPool => "mempool",
            Command::FeeFilter => "feefilter",
            Command::SendHeaders => "sendheaders",
            Command::SendCmpct => "sendcmpct",
            Command::CmpctBlock => "cmpctblock",
            Command::GetBlockTxn => "getblocktxn",
            Command::BlockTxn => "blocktxn",
            Command::FilterLoad => "filterload",
            Command::FilterAdd => "filteradd",
            Command::FilterClear => "filterclear",
            Command::MerkleBlock => "merkleblock",
            Command::Reject => "reject",
        }
    }

    pub fn find(name: &str) -> Option<Command> {
        Command::iter().find(|c| c.as_str() == name)
    }
}

/// One decoded, typed protocol message.
#[derive(Debug)]
pub enum ProtocolMessage {
    Version(VersionMessage),
    Verack(VerackMessage),
    Ping(PingMessage),
    Pong(PongMessage),
    GetAddr(GetAddrMessage),
    Addr(AddrMessage),
    Inv(InvMessage),
    GetData(GetDataMessage),
    NotFound(NotFoundMessage),
    Tx(TxMessage),
    Block(BlockMessage),
    Headers(HeadersMessage),
    GetHeaders(GetHeadersMessage),
    GetBlocks(GetBlocksMessage),
    MemPool(MemPoolMessage),
    FeeFilter(FeeFilterMessage),
    SendHeaders(SendHeadersMessage),
    SendCmpct(SendCmpctMessage),
    CmpctBlock(CmpctBlockMessage),
    GetBlockTxn(GetBlockTxnMessage),
    BlockTxn(BlockTxnMessage),
    FilterLoad(FilterLoadMessage),
    FilterAdd(FilterAddMessage),
    FilterClear(FilterClearMessage),
    MerkleBlock(MerkleBlockMessage),
    Reject(RejectMessage),
}

macro_rules! for_each_variant {
    ($self:expr, $binding:ident => $body:expr) => {
        match $self {
            ProtocolMessage::Version($binding) => $body,
            ProtocolMessage::Verack($binding) => $body,
            ProtocolMessage::Ping($binding) => $body,
            ProtocolMessage::Pong($binding) => $body,
            ProtocolMessage::GetAddr($binding) => $body,
            ProtocolMessage::Addr($binding) => $body,
            ProtocolMessage::Inv($binding) => $body,
            ProtocolMessage::GetData($binding) => $body,
            ProtocolMessage::NotFound($binding) => $body,
            ProtocolMessage::Tx($binding) => $body,
            ProtocolMessage::Block($binding) => $body,
            ProtocolMessage::Headers($binding) => $body,
            ProtocolMessage::GetHeaders($binding) => $body,
            ProtocolMessage::GetBlocks($binding) => $body,
            ProtocolMessage::MemPool($binding) => $body,
            ProtocolMessage::FeeFilter($binding) => $body,
            ProtocolMessage::SendHeaders($binding) => $body,
            ProtocolMessage::SendCmpct($binding) => $body,
            ProtocolMessage::CmpctBlock($binding) => $body,
            ProtocolMessage::GetBlockTxn($binding) => $body,
            ProtocolMessage::BlockTxn($binding) => $body,
            ProtocolMessage::FilterLoad($binding) => $body,
            ProtocolMessage::FilterAdd($binding) => $body,
            ProtocolMessage::FilterClear($binding) => $body,
            ProtocolMessage::MerkleBlock($binding) => $body,
            ProtocolMessage::Reject($binding) => $body,
        }
    };
}

impl ProtocolMessage {
    pub fn command(&self) -> Command {
        for_each_variant!(self, m => m.command_const())
    }

    pub fn to_value(&self) -> SVal {
        for_each_variant!(self, m => m.to_value())
    }

    pub fn apply(&self, node: &Node, peer: &mut Peer) -> PeerResult<()> {
        for_each_variant!(self, m => m.apply(node, peer))
    }

    /// Serializes this message to a full wire frame (envelope + payload).
    pub fn to_frame_bytes(&self, magic: u32) -> Vec<u8> {
        let payload = for_each_variant!(self, m => m.encode_payload());
        crate::codec::frame::encode(magic, self.command().as_str(), &payload)
    }

    /// Decodes a payload given an already-resolved [`Command`].
    pub fn decode(command: Command, payload: &[u8]) -> PeerResult<ProtocolMessage> {
        Ok(match command {
            Command::Version => ProtocolMessage::Version(VersionMessage::decode_payload(payload)?),
            Command::Verack => ProtocolMessage::Verack(VerackMessage::decode_payload(payload)?),
            Command::Ping => ProtocolMessage::Ping(PingMessage::decode_payload(payload)?),
            Command::Pong => ProtocolMessage::Pong(PongMessage::decode_payload(payload)?),
            Command::GetAddr => ProtocolMessage::GetAddr(GetAddrMessage::decode_payload(payload)?),
            Command::Addr => ProtocolMessage::Addr(AddrMessage::decode_payload(payload)?),
            Command::Inv => ProtocolMessage::Inv(InvMessage::decode_payload(payload)?),
            Command::GetData => ProtocolMessage::GetData(GetDataMessage::decode_payload(payload)?),
            Command::NotFound => ProtocolMessage::NotFound(NotFoundMessage::decode_payload(payload)?),
            Command::Tx => ProtocolMessage::Tx(TxMessage::decode_payload(payload)?),
            Command::Block => ProtocolMessage::Block(BlockMessage::decode_payload(payload)?),
            Command::Headers => ProtocolMessage::Headers(HeadersMessage::decode_payload(payload)?),
            Command::GetHeaders => ProtocolMessage::GetHeaders(GetHeadersMessage::decode_payload(payload)?),
            Command::GetBlocks => ProtocolMessage::GetBlocks(GetBlocksMessage::decode_payload(payload)?),
            Command::MemPool => ProtocolMessage::MemPool(MemPoolMessage::decode_payload(payload)?),
            Command::FeeFilter => ProtocolMessage::FeeFilter(FeeFilterMessage::decode_payload(payload)?),
            Command::SendHeaders => ProtocolMessage::SendHeaders(SendHeadersMessage::decode_payload(payload)?),
            Command::SendCmpct => ProtocolMessage::SendCmpct(SendCmpctMessage::decode_payload(payload)?),
            Command::CmpctBlock => ProtocolMessage::CmpctBlock(CmpctBlockMessage::decode_payload(payload)?),
            Command::GetBlockTxn => ProtocolMessage::GetBlockTxn(GetBlockTxnMessage::decode_payload(payload)?),
            Command::BlockTxn => ProtocolMessage::BlockTxn(BlockTxnMessage::decode_payload(payload)?),
            Command::FilterLoad => ProtocolMessage::FilterLoad(FilterLoadMessage::decode_payload(payload)?),
            Command::FilterAdd => ProtocolMessage::FilterAdd(FilterAddMessage::decode_payload(payload)?),
            Command::FilterClear => ProtocolMessage::FilterClear(FilterClearMessage::decode_payload(payload)?),
            Command::MerkleBlock => ProtocolMessage::MerkleBlock(MerkleBlockMessage::decode_payload(payload)?),
            Command::Reject => ProtocolMessage::Reject(RejectMessage::decode_payload(payload)?),
        })
    }
}

/// Helper so the macro above can call a uniform method name regardless of
/// the concrete `WireMessage` type bound to `COMMAND`.
trait CommandConst {
    fn command_const(&self) -> Command;
}

impl<T: WireMessage> CommandConst for T {
    fn command_const(&self) -> Command {
        T::COMMAND
    }
}

pub(crate) fn require_empty(payload: &[u8]) -> PeerResult<()> {
    if payload.is_empty() {
        Ok(())
    } else {
        Err(PeerError::protocol("expected empty payload"))
    }
}

pub(crate) fn no_payload() -> Vec<u8> {
    ByteWriter::new().into_bytes()
}
