//! The stateful half of one peer session: handshake progress, inventory
//! bookkeeping, and ping/pong liveness. Spec.md §4.5 names the states
//! `NEW -> SENT_VERSION -> GOT_VERSION -> GOT_VERACK (READY) -> CLOSING`;
//! `recompute_state` derives the ordinal purely from three monotonic
//! booleans so the "no backwards transition" invariant holds by
//! construction rather than needing to be checked at every call site.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::time::Instant;

use crate::codec::{Hash256, InventoryType};
use crate::error::{PeerError, PeerResult};
use crate::messages::{Command, ProtocolMessage};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PeerState {
    New,
    SentVersion,
    GotVersion,
    Ready,
    Closing,
}

pub struct RemoteVersion {
    pub protocol_version: i32,
    pub services: u64,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: i32,
    pub relay: bool,
}

/// Soft cap on the outbound queue per spec.md §4.4's back-pressure rule: a
/// peer that can't keep its queue below this is marked slow and eventually
/// closed.
pub const OUTBOUND_SOFT_CAP: usize = 1_000;

pub struct Peer {
    pub remote_addr: SocketAddr,
    pub is_outbound: bool,
    state: PeerState,

    version_sent: bool,
    version_received: bool,
    verack_sent: bool,
    verack_received: bool,

    pub remote: Option<RemoteVersion>,
    pub self_nonce: u64,

    outbound: VecDeque<ProtocolMessage>,
    pub slow: bool,

    /// Inventory this peer is known to already have (announced by us or by
    /// them), so we don't re-announce it.
    known_inventory: HashSet<Hash256>,
    /// `getdata` requests we issued, awaiting a `tx`/`block`/`notfound`
    /// reply, keyed by hash so the response can be matched to the request.
    pending_getdata: HashMap<Hash256, InventoryType>,
    /// Block hashes for which we issued `getblocktxn`, awaiting a
    /// correlated `blocktxn` reply (spec.md §9 Open Question: unmatched
    /// `blocktxn` is ignored).
    pending_getblocktxn: HashSet<Hash256>,

    pub last_ping_nonce: Option<u64>,
    pub last_ping_sent_at: Option<Instant>,
    pub last_activity: Instant,

    /// Minimum fee rate (satoshis/kvB) this peer wants relayed, set by a
    /// `feefilter` message; `0` means no filter.
    pub min_fee_rate: u64,
    /// Set by `sendheaders`: announce new blocks via `headers` instead of
    /// `inv`.
    pub prefers_headers: bool,
    /// Set by `sendcmpct`: compact-block announcement mode, per BIP 152.
    pub compact_blocks_high_bandwidth: bool,
    pub compact_blocks_version: u64,
    /// Set by `filterload`/`filteradd`/`filterclear`: bloom-filtered block
    /// relay is requested for this peer. The filter bytes themselves are
    /// opaque to the protocol core (spec.md §1 excludes bloom-filter
    /// matching logic) — only the on/off state is tracked here.
    pub bloom_filter_active: bool,
}

impl Peer {
    pub fn new(remote_addr: SocketAddr, is_outbound: bool, self_nonce: u64) -> Self {
        Peer {
            remote_addr,
            is_outbound,
            state: PeerState::New,
            version_sent: false,
            version_received: false,
            verack_sent: false,
            verack_received: false,
            remote: None,
            self_nonce,
            outbound: VecDeque::new(),
            slow: false,
            known_inventory: HashSet::new(),
            pending_getdata: HashMap::new(),
            pending_getblocktxn: HashSet::new(),
            last_ping_nonce: None,
            last_ping_sent_at: None,
            last_activity: Instant::now(),
            min_fee_rate: 0,
            prefers_headers: false,
            compact_blocks_high_bandwidth: false,
            compact_blocks_version: 0,
            bloom_filter_active: false,
        }
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == PeerState::Ready
    }

    pub fn state_has_sent_version(&self) -> bool {
        self.version_sent
    }

    pub fn state_has_sent_verack(&self) -> bool {
        self.verack_sent
    }

    fn recompute_state(&mut self) {
        if self.state == PeerState::Closing {
            return;
        }
        self.state = match (self.version_sent, self.version_received, self.verack_received) {
            (false, _, _) => PeerState::New,
            (true, false, _) => PeerState::SentVersion,
            (true, true, false) => PeerState::GotVersion,
            (true, true, true) => PeerState::Ready,
        };
    }

    pub fn mark_version_sent(&mut self) {
        self.version_sent = true;
        self.recompute_state();
    }

    pub fn mark_version_received(&mut self, remote: RemoteVersion) -> PeerResult<()> {
        if self.version_received {
            return Err(PeerError::protocol("duplicate version message"));
        }
        self.version_received = true;
        self.remote = Some(remote);
        self.recompute_state();
        Ok(())
    }

    pub fn mark_verack_sent(&mut self) {
        self.verack_sent = true;
    }

    pub fn mark_verack_received(&mut self) {
        self.verack_received = true;
        self.recompute_state();
    }

    pub fn close(&mut self, reason: &str) {
        log::debug!("closing peer {} ({reason})", self.remote_addr);
        self.state = PeerState::Closing;
        self.outbound.clear();
    }

    /// Enforces "inbound peer must not send anything before receiving
    /// version; any other frame before handshake completion is a protocol
    /// error" (spec.md §4.5).
    pub fn validate_incoming(&self, command: Command) -> PeerResult<()> {
        if self.state == PeerState::Closing {
            return Err(PeerError::protocol("peer is closing"));
        }
        let handshake_done = self.state == PeerState::Ready;
        let allowed_before_handshake = matches!(command, Command::Version | Command::Verack);
        if !handshake_done && !allowed_before_handshake {
            return Err(PeerError::handshake(format!(
                "received '{}' before handshake completed (state {:?})",
                command.as_str(),
                self.state
            )));
        }
        Ok(())
    }

    pub fn enqueue(&mut self, message: ProtocolMessage) {
        self.outbound.push_back(message);
        if self.outbound.len() > OUTBOUND_SOFT_CAP {
            self.slow = true;
        }
    }

    pub fn pop_outbound(&mut self) -> Option<ProtocolMessage> {
        self.outbound.pop_front()
    }

    pub fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    // --- inventory bookkeeping -------------------------------------------------

    pub fn knows(&self, hash: &Hash256) -> bool {
        self.known_inventory.contains(hash)
    }

    pub fn remember_known(&mut self, hash: Hash256) {
        self.known_inventory.insert(hash);
    }

    pub fn record_getdata_sent(&mut self, hash: Hash256, kind: InventoryType) {
        self.pending_getdata.insert(hash, kind);
    }

    /// Consumes (removes) a pending `getdata` entry, returning its inventory
    /// type if one was outstanding for `hash`.
    pub fn take_pending_getdata(&mut self, hash: &Hash256) -> Option<InventoryType> {
        self.pending_getdata.remove(hash)
    }

    pub fn record_getblocktxn_sent(&mut self, block_hash: Hash256) {
        self.pending_getblocktxn.insert(block_hash);
    }

    /// `true` if a prior `getblocktxn` for `block_hash` is outstanding; also
    /// clears it, since a `blocktxn` reply (matched or not) resolves it.
    pub fn take_pending_getblocktxn(&mut self, block_hash: &Hash256) -> bool {
        self.pending_getblocktxn.remove(block_hash)
    }

    pub fn arm_ping(&mut self, nonce: u64) {
        self.last_ping_nonce = Some(nonce);
        self.last_ping_sent_at = Some(Instant::now());
    }

    pub fn resolve_pong(&mut self, nonce: u64) -> bool {
        if self.last_ping_nonce == Some(nonce) {
            self.last_ping_nonce = None;
            self.last_ping_sent_at = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn peer() -> Peer {
        Peer::new("127.0.0.1:8333".parse().unwrap(), true, 1)
    }

    fn remote(nonce: u64) -> RemoteVersion {
        RemoteVersion {
            protocol_version: 70015,
            services: 1,
            nonce,
            user_agent: "/test/".to_string(),
            start_height: 0,
            relay: true,
        }
    }

    #[test]
    fn fsm_is_monotone_through_a_full_handshake() {
        let mut p = peer();
        assert_eq!(p.state(), PeerState::New);
        p.mark_version_sent();
        assert_eq!(p.state(), PeerState::SentVersion);
        p.mark_version_received(remote(99)).unwrap();
        assert_eq!(p.state(), PeerState::GotVersion);
        p.mark_verack_received();
        assert_eq!(p.state(), PeerState::Ready);
    }

    #[test]
    fn out_of_order_verack_then_version_also_reaches_ready() {
        let mut p = peer();
        p.mark_version_sent();
        p.mark_verack_received();
        assert_eq!(p.state(), PeerState::SentVersion, "verack alone must not skip GOT_VERSION");
        p.mark_version_received(remote(1)).unwrap();
        assert_eq!(p.state(), PeerState::Ready);
    }

    #[test]
    fn duplicate_version_is_rejected() {
        let mut p = peer();
        p.mark_version_received(remote(1)).unwrap();
        assert!(p.mark_version_received(remote(2)).is_err());
    }

    #[test]
    fn validate_incoming_rejects_non_handshake_frames_before_ready() {
        let p = peer();
        assert!(p.validate_incoming(Command::Version).is_ok());
        assert!(p.validate_incoming(Command::Ping).is_err());
    }

    #[test]
    fn closing_is_terminal() {
        let mut p = peer();
        p.mark_version_sent();
        p.close("test");
        p.mark_version_received(remote(1)).unwrap();
        assert_eq!(p.state(), PeerState::Closing);
    }

    #[test]
    fn outbound_queue_past_soft_cap_marks_peer_slow() {
        let mut p = peer();
        for _ in 0..=OUTBOUND_SOFT_CAP {
            p.enqueue(ProtocolMessage::Ping(crate::messages::PingMessage { nonce: 0 }));
        }
        assert!(p.slow);
    }

    #[test]
    fn getdata_and_getblocktxn_correlation_round_trip() {
        let mut p = peer();
        let hash = Hash256([9u8; 32]);
        p.record_getdata_sent(hash, InventoryType::MsgTx);
        assert_eq!(p.take_pending_getdata(&hash), Some(InventoryType::MsgTx));
        assert_eq!(p.take_pending_getdata(&hash), None);

        p.record_getblocktxn_sent(hash);
        assert!(p.take_pending_getblocktxn(&hash));
        assert!(!p.take_pending_getblocktxn(&hash), "second take must find nothing");
    }
}
