//! The cooperative scheduler (spec.md §4.6): accepts inbound connections,
//! dials outbound peers, and drives each session as an independent task.
//! The original source rolls its own stack and restores a ucontext to
//! resume a suspended fiber; spec.md §9 flags that as needing a redesign
//! for Rust, and the natural one is to let `async`/`.await` be the
//! suspension point — a transport's `NEED_MORE`/socket `WouldBlock` is
//! exactly a tokio task yielding at an `.await`. Live sessions are tracked
//! in a [`Slab`] of task handles so the scheduler never needs a back
//! reference into the peer/connection/transport triangle it spawned.

pub mod timer;

pub use timer::{TimerId, TimerOutcome, TimerWheel};

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::conn::tls;
use crate::conn::Connection;
use crate::error::{PeerError, PeerResult};
use crate::node::{Node, Peer};
use crate::slab::{Key, Slab};
use crate::transport::MessageTransport;

pub struct Scheduler {
    node: Arc<Node>,
    sessions: Mutex<Slab<JoinHandle<PeerResult<()>>>>,
    /// One entry per remote IP currently holding a session, used to break
    /// simultaneous-connect ties (spec.md §4.5): when two sessions would
    /// exist to the same remote host at once, whichever has the lower
    /// `(remote_ip, remote_port)` pair survives.
    by_remote_ip: Mutex<HashMap<IpAddr, (SocketAddr, Key)>>,
}

impl Scheduler {
    pub fn new(node: Arc<Node>) -> Arc<Self> {
        Arc::new(Scheduler {
            node,
            sessions: Mutex::new(Slab::new()),
            by_remote_ip: Mutex::new(HashMap::new()),
        })
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Binds the configured listen address and accepts inbound connections
    /// until `listener` errors or the process is shut down. If the config
    /// names a TLS certificate/key, inbound sockets are TLS-wrapped before
    /// a session is spawned.
    pub async fn listen(self: &Arc<Self>) -> PeerResult<()> {
        let addr: SocketAddr = format!("{}:{}", self.node.config.listen_host, self.node.config.listen_port)
            .parse()
            .map_err(|e| PeerError::protocol(format!("bad listen address: {e}")))?;
        let listener = TcpListener::bind(addr).await?;
        log::info!("listening on {addr}");

        let acceptor = match (&self.node.config.listen_tls_cert, &self.node.config.listen_tls_key) {
            (Some(cert), Some(key)) => Some(tls::load_acceptor(cert, key)?),
            _ => None,
        };

        loop {
            let (socket, remote) = listener.accept().await?;
            match &acceptor {
                Some(acceptor) => match tls::accept(acceptor, socket).await {
                    Ok(connection) => self.spawn_with_connection(connection, remote, false),
                    Err(err) => log::warn!("TLS handshake with {remote} failed: {err}"),
                },
                None => self.spawn_session(socket, remote, false),
            }
        }
    }

    /// Dials a single outbound peer and drives its session to completion.
    pub async fn connect(self: &Arc<Self>, addr: SocketAddr) -> PeerResult<()> {
        if self.active_sessions() >= self.node.config.max_peers {
            return Err(PeerError::protocol("max_peers reached, refusing new outbound connection"));
        }
        let socket = TcpStream::connect(addr).await?;
        self.spawn_session(socket, addr, true);
        Ok(())
    }

    fn spawn_session(self: &Arc<Self>, socket: TcpStream, remote: SocketAddr, is_outbound: bool) {
        let connection = Connection::new(socket);
        self.spawn_with_connection(connection, remote, is_outbound);
    }

    fn spawn_with_connection(self: &Arc<Self>, connection: Connection, remote: SocketAddr, is_outbound: bool) {
        if !self.claim_remote(remote) {
            log::info!("closing redundant simultaneous connection to {remote}");
            return;
        }

        let node = Arc::clone(&self.node);
        let peer = Peer::new(remote, is_outbound, node.self_nonce);
        let transport = MessageTransport::new(connection, peer, node);

        let handle = tokio::spawn(transport.run());
        let key = self.sessions.lock().unwrap().insert(handle);

        let mut by_ip = self.by_remote_ip.lock().unwrap();
        by_ip.insert(remote.ip(), (remote, key));
    }

    /// Returns `true` if this connection should proceed. If a session to
    /// the same remote IP already exists, keeps whichever of the two has
    /// the lower `(remote_ip, remote_port)` pair and aborts the other.
    fn claim_remote(&self, remote: SocketAddr) -> bool {
        let mut by_ip = self.by_remote_ip.lock().unwrap();
        let Some((existing_addr, existing_key)) = by_ip.get(&remote.ip()).copied() else {
            return true;
        };

        let existing_pair = (existing_addr.ip(), existing_addr.port());
        let new_pair = (remote.ip(), remote.port());
        if new_pair < existing_pair {
            let mut sessions = self.sessions.lock().unwrap();
            if let Some(handle) = sessions.remove(existing_key) {
                handle.abort();
            }
            by_ip.remove(&remote.ip());
            true
        } else {
            false
        }
    }

    /// Drops slab entries for sessions that have already finished. Call
    /// periodically (e.g. from the same loop driving the timer wheel).
    pub fn reap_finished(&self) {
        let mut sessions = self.sessions.lock().unwrap();
        let finished: Vec<Key> = sessions
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(key, _)| key)
            .collect();
        for key in finished {
            sessions.remove(key);
        }
        drop(sessions);

        let mut by_ip = self.by_remote_ip.lock().unwrap();
        by_ip.retain(|_, (_, key)| self.sessions.lock().unwrap().get(*key).is_some());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::NodeConfig;
    use crate::hooks::{AddressBook, InMemoryBlockchain, NoopMetrics};

    fn node() -> Arc<Node> {
        Arc::new(Node::new(
            NodeConfig::default(),
            Arc::new(InMemoryBlockchain::new()),
            Arc::new(AddressBook::new()),
            Arc::new(NoopMetrics),
        ))
    }

    #[tokio::test]
    async fn connect_refuses_once_max_peers_reached() {
        let mut config = NodeConfig::default();
        config.max_peers = 0;
        let node = Arc::new(Node::new(
            config,
            Arc::new(InMemoryBlockchain::new()),
            Arc::new(AddressBook::new()),
            Arc::new(NoopMetrics),
        ));
        let scheduler = Scheduler::new(node);
        let result = scheduler.connect("127.0.0.1:1".parse().unwrap()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn reap_finished_drops_completed_sessions() {
        let scheduler = Scheduler::new(node());
        let handle: JoinHandle<PeerResult<()>> = tokio::spawn(async { Ok(()) });
        let key = scheduler.sessions.lock().unwrap().insert(handle);
        // give the spawned no-op task a chance to finish
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        scheduler.reap_finished();
        assert!(scheduler.sessions.lock().unwrap().get(key).is_none());
    }

    #[tokio::test]
    async fn claim_remote_keeps_the_lower_address_pair_and_aborts_the_other() {
        let scheduler = Scheduler::new(node());
        let higher: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        let lower: SocketAddr = "10.0.0.1:8000".parse().unwrap();

        assert!(scheduler.claim_remote(higher));
        let handle: JoinHandle<PeerResult<()>> = tokio::spawn(async {
            std::future::pending::<()>().await;
            Ok(())
        });
        let key = scheduler.sessions.lock().unwrap().insert(handle);
        scheduler.by_remote_ip.lock().unwrap().insert(higher.ip(), (higher, key));

        // A session to the same IP with a lower port pair wins: the higher
        // one is aborted and removed, and the new one is accepted.
        assert!(scheduler.claim_remote(lower));
        assert!(scheduler.sessions.lock().unwrap().get(key).is_none());
    }

    #[tokio::test]
    async fn claim_remote_rejects_a_higher_address_pair() {
        let scheduler = Scheduler::new(node());
        let lower: SocketAddr = "10.0.0.1:1000".parse().unwrap();
        let higher: SocketAddr = "10.0.0.1:2000".parse().unwrap();

        assert!(scheduler.claim_remote(lower));
        let handle: JoinHandle<PeerResult<()>> = tokio::spawn(async { Ok(()) });
        let key = scheduler.sessions.lock().unwrap().insert(handle);
        scheduler.by_remote_ip.lock().unwrap().insert(lower.ip(), (lower, key));

        assert!(!scheduler.claim_remote(higher), "higher pair must lose the tie-break");
        assert!(scheduler.sessions.lock().unwrap().get(key).is_some(), "winning session stays intact");
    }
}
