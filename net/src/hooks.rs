//! External collaborator interfaces per spec.md §6. The protocol core only
//! calls through these traits; it never touches consensus, persistence, or
//! mempool policy directly — those stay out of scope as documented in
//! spec.md §1.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::codec::Hash256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted,
    Duplicate,
    Invalid,
}

/// The blockchain data model and validation are out of scope (spec.md §1);
/// this is the opaque hook the protocol layer invokes to hand off a
/// received tx/block and to answer "do I already have this?" queries.
pub trait Blockchain: Send + Sync {
    fn add_tx(&self, hash: Hash256, raw: &[u8]) -> AcceptOutcome;
    fn add_block(&self, hash: Hash256, raw: &[u8]) -> AcceptOutcome;
    fn have_tx(&self, hash: &Hash256) -> bool;
    fn have_block(&self, hash: &Hash256) -> bool;
    fn fetch_tx(&self, hash: &Hash256) -> Option<Vec<u8>>;
    fn fetch_block(&self, hash: &Hash256) -> Option<Vec<u8>>;

    /// Compact-block responder lookup (BIP 152 `getblocktxn`/`blocktxn`):
    /// resolve the transactions at `indexes` within the block identified by
    /// `block_hash`. The default always answers "unknown", since blocks are
    /// stored opaquely here; a real chain/mempool index would override it.
    fn fetch_block_txn(&self, _block_hash: &Hash256, _indexes: &[u64]) -> Option<Vec<Vec<u8>>> {
        None
    }
}

/// In-memory stand-in used by tests and the demo binary. A production
/// deployment swaps this for a real chain/mempool/UTXO engine without the
/// protocol core changing at all.
#[derive(Default)]
pub struct InMemoryBlockchain {
    txs: Mutex<std::collections::HashMap<Hash256, Vec<u8>>>,
    blocks: Mutex<std::collections::HashMap<Hash256, Vec<u8>>>,
}

impl InMemoryBlockchain {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Blockchain for InMemoryBlockchain {
    fn add_tx(&self, hash: Hash256, raw: &[u8]) -> AcceptOutcome {
        let mut txs = self.txs.lock().unwrap();
        if txs.contains_key(&hash) {
            AcceptOutcome::Duplicate
        } else {
            txs.insert(hash, raw.to_vec());
            AcceptOutcome::Accepted
        }
    }

    fn add_block(&self, hash: Hash256, raw: &[u8]) -> AcceptOutcome {
        let mut blocks = self.blocks.lock().unwrap();
        if blocks.contains_key(&hash) {
            AcceptOutcome::Duplicate
        } else {
            blocks.insert(hash, raw.to_vec());
            AcceptOutcome::Accepted
        }
    }

    fn have_tx(&self, hash: &Hash256) -> bool {
        self.txs.lock().unwrap().contains_key(hash)
    }

    fn have_block(&self, hash: &Hash256) -> bool {
        self.blocks.lock().unwrap().contains_key(hash)
    }

    fn fetch_tx(&self, hash: &Hash256) -> Option<Vec<u8>> {
        self.txs.lock().unwrap().get(hash).cloned()
    }

    fn fetch_block(&self, hash: &Hash256) -> Option<Vec<u8>> {
        self.blocks.lock().unwrap().get(hash).cloned()
    }
}

/// `self_nonces_seen` lets `version` handling detect self-connections: the
/// node remembers the nonces of the `version` messages it has sent out and
/// rejects a session whose remote nonce matches one of its own.
pub trait AddressBookHandle: Send + Sync {
    fn add(&self, entries: Vec<crate::codec::NetworkAddress>);
    fn sample(&self, n: usize, max_age_secs: u64) -> Vec<crate::codec::NetworkAddress>;
    fn remember_self_nonce(&self, nonce: u64);
    fn is_self_nonce(&self, nonce: u64) -> bool;
}

#[derive(Default)]
pub struct AddressBook {
    entries: Mutex<Vec<(u32, crate::codec::NetworkAddress)>>,
    self_nonces: Mutex<HashSet<u64>>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn now_secs() -> u32 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0)
    }
}

impl AddressBookHandle for AddressBook {
    fn add(&self, new_entries: Vec<crate::codec::NetworkAddress>) {
        let now = Self::now_secs();
        let mut entries = self.entries.lock().unwrap();
        for addr in new_entries {
            let timestamp = addr.timestamp.unwrap_or(now);
            entries.push((timestamp, addr));
        }
    }

    fn sample(&self, n: usize, max_age_secs: u64) -> Vec<crate::codec::NetworkAddress> {
        let now = Self::now_secs() as u64;
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .filter(|(timestamp, _)| now.saturating_sub(*timestamp as u64) < max_age_secs)
            .rev()
            .take(n)
            .map(|(_, addr)| *addr)
            .collect()
    }

    fn remember_self_nonce(&self, nonce: u64) {
        self.self_nonces.lock().unwrap().insert(nonce);
    }

    fn is_self_nonce(&self, nonce: u64) -> bool {
        self.self_nonces.lock().unwrap().contains(&nonce)
    }
}

/// No behavioral contract beyond "accept a leveled message" — logging
/// itself goes through the `log` facade; this trait exists only so
/// higher layers can be tested against a capturing double instead of the
/// global logger.
pub trait Logger: Send + Sync {
    fn log(&self, level: log::Level, message: &str);
}

pub struct FacadeLogger;

impl Logger for FacadeLogger {
    fn log(&self, level: log::Level, message: &str) {
        log::log!(level, "{message}");
    }
}

/// No behavioral contract — counters/gauges/histograms, a no-op by default.
pub trait Metrics: Send + Sync {
    fn counter(&self, name: &str, delta: u64);
    fn gauge(&self, name: &str, value: i64);
}

pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn counter(&self, _name: &str, _delta: u64) {}
    fn gauge(&self, _name: &str, _value: i64) {}
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn blockchain_add_tx_reports_duplicate_on_second_insert() {
        let chain = InMemoryBlockchain::new();
        let hash = Hash256([1u8; 32]);
        assert_eq!(chain.add_tx(hash, b"a"), AcceptOutcome::Accepted);
        assert_eq!(chain.add_tx(hash, b"a"), AcceptOutcome::Duplicate);
        assert!(chain.have_tx(&hash));
    }

    #[test]
    fn address_book_samples_only_fresh_entries() {
        let book = AddressBook::new();
        let stale = crate::codec::NetworkAddress {
            timestamp: Some(0),
            services: 0,
            addr: "1.1.1.1:8333".parse().unwrap(),
        };
        let fresh = crate::codec::NetworkAddress {
            timestamp: Some(AddressBook::now_secs()),
            services: 0,
            addr: "2.2.2.2:8333".parse().unwrap(),
        };
        book.add(vec![stale, fresh]);
        let sample = book.sample(1000, 3 * 3600);
        assert_eq!(sample.len(), 1);
        assert_eq!(sample[0].addr, fresh.addr);
    }

    #[test]
    fn self_nonce_round_trips() {
        let book = AddressBook::new();
        book.remember_self_nonce(42);
        assert!(book.is_self_nonce(42));
        assert!(!book.is_self_nonce(43));
    }
}
