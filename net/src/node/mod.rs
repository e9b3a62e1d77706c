//! The node: shared, process-wide state every [`Peer`](peer::Peer) session
//! hangs off of — config, identity (self nonce, advertised services), and
//! the external collaborators from [`crate::hooks`]. One `Node` is shared
//! (via `Arc`) across every connection the scheduler drives.

pub mod peer;

pub use peer::{Peer, PeerState, RemoteVersion};

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use rand::RngCore;

use crate::config::NodeConfig;
use crate::hooks::{AddressBookHandle, Blockchain, Metrics};
use crate::messages::VersionMessage;

pub struct Node {
    pub config: NodeConfig,
    pub self_nonce: u64,
    pub blockchain: Arc<dyn Blockchain>,
    pub address_book: Arc<dyn AddressBookHandle>,
    pub metrics: Arc<dyn Metrics>,
    best_height: AtomicI32,
}

impl Node {
    pub fn new(
        config: NodeConfig,
        blockchain: Arc<dyn Blockchain>,
        address_book: Arc<dyn AddressBookHandle>,
        metrics: Arc<dyn Metrics>,
    ) -> Self {
        let self_nonce = rand::thread_rng().next_u64();
        address_book.remember_self_nonce(self_nonce);
        Node {
            config,
            self_nonce,
            blockchain,
            address_book,
            metrics,
            best_height: AtomicI32::new(0),
        }
    }

    pub fn magic(&self) -> u32 {
        self.config.network_magic
    }

    pub fn best_height(&self) -> i32 {
        self.best_height.load(Ordering::Relaxed)
    }

    pub fn set_best_height(&self, height: i32) {
        self.best_height.store(height, Ordering::Relaxed);
    }

    /// Builds the `version` message this node sends to a freshly connected
    /// peer, identifying itself and its nonce (used downstream for
    /// self-connection detection).
    pub fn make_version(&self, peer: &Peer) -> VersionMessage {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let recv = crate::codec::NetworkAddress {
            timestamp: None,
            services: 0,
            addr: peer.remote_addr,
        };
        let from = crate::codec::NetworkAddress {
            timestamp: None,
            services: 1,
            addr: ([0, 0, 0, 0], 0).into(),
        };
        VersionMessage {
            version: self.config.network_protocol_version,
            services: 1,
            timestamp: now,
            addr_recv: recv,
            addr_from: from,
            nonce: self.self_nonce,
            user_agent: self.config.network_user_agent.clone(),
            start_height: self.best_height(),
            relay: true,
        }
    }
}

/// A ready-made `Node` for other modules' unit tests, so every message
/// type's `apply()` tests don't each hand-wire the collaborator stubs.
#[cfg(test)]
pub mod test_support {
    use super::*;
    use crate::hooks::{AddressBook, InMemoryBlockchain, NoopMetrics};

    pub fn plain_node() -> Node {
        Node::new(
            NodeConfig::default(),
            Arc::new(InMemoryBlockchain::new()),
            Arc::new(AddressBook::new()),
            Arc::new(NoopMetrics),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hooks::{AddressBook, InMemoryBlockchain, NoopMetrics};

    fn node() -> Node {
        Node::new(
            NodeConfig::default(),
            Arc::new(InMemoryBlockchain::new()),
            Arc::new(AddressBook::new()),
            Arc::new(NoopMetrics),
        )
    }

    #[test]
    fn self_nonce_is_registered_with_the_address_book() {
        let n = node();
        assert!(n.address_book.is_self_nonce(n.self_nonce));
    }

    #[test]
    fn make_version_carries_the_node_identity() {
        let n = node();
        let p = Peer::new("1.2.3.4:8333".parse().unwrap(), true, n.self_nonce);
        let v = n.make_version(&p);
        assert_eq!(v.nonce, n.self_nonce);
        assert_eq!(v.version, n.config.network_protocol_version);
    }
}
