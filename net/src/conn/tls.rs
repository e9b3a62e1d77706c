//! TLS variant of the connection layer (spec.md §4.3). Builds a
//! `tokio-rustls` acceptor from a PEM certificate chain and private key and
//! hands back a [`Connection`] wrapping the completed session, the same
//! way [`super::Connection::new`] wraps a plain `TcpStream` — the scheduler
//! doesn't need a second code path once the handshake finishes.
//!
//! Grounded in `chia-ssl`'s use of `rustls` for its peer certificate setup;
//! this core only needs the listener side (inbound connections arriving on
//! a TLS-configured listen address), so outbound connect stays plain TCP.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::{Certificate, PrivateKey, ServerConfig};
use rustls_pemfile::{certs, pkcs8_private_keys, rsa_private_keys};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;

use crate::error::{PeerError, PeerResult};

use super::Connection;

/// Loads a certificate chain and private key from PEM files and builds a
/// reusable [`TlsAcceptor`]. Called once at startup from
/// `NodeConfig.listen_tls_cert`/`listen_tls_key`.
pub fn load_acceptor(cert_path: &str, key_path: &str) -> PeerResult<TlsAcceptor> {
    let chain = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .map_err(|e| PeerError::protocol(format!("invalid TLS certificate/key: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Completes the server-side TLS handshake on an accepted socket and wraps
/// the result as a [`Connection`], ready to be driven by a transport the
/// same way a plain socket would be.
pub async fn accept(acceptor: &TlsAcceptor, socket: TcpStream) -> PeerResult<Connection> {
    let session = acceptor.accept(socket).await?;
    Ok(Connection::new_tls(session))
}

fn load_certs(path: &str) -> PeerResult<Vec<Certificate>> {
    let file = File::open(path)
        .map_err(|e| PeerError::protocol(format!("cannot open TLS certificate '{path}': {e}")))?;
    let mut reader = BufReader::new(file);
    let raw = certs(&mut reader)
        .map_err(|e| PeerError::protocol(format!("cannot parse TLS certificate '{path}': {e}")))?;
    if raw.is_empty() {
        return Err(PeerError::protocol(format!("no certificates found in '{path}'")));
    }
    Ok(raw.into_iter().map(Certificate).collect())
}

fn load_private_key(path: &str) -> PeerResult<PrivateKey> {
    let file = File::open(path)
        .map_err(|e| PeerError::protocol(format!("cannot open TLS private key '{path}': {e}")))?;
    let mut reader = BufReader::new(file);
    let mut pkcs8 = pkcs8_private_keys(&mut reader)
        .map_err(|e| PeerError::protocol(format!("cannot parse TLS private key '{path}': {e}")))?;
    if let Some(key) = pkcs8.pop() {
        return Ok(PrivateKey(key));
    }

    // Re-open: the pkcs8 parser consumes the reader even when it finds
    // nothing, so a fresh reader is needed to try the PKCS#1 RSA format.
    let file = File::open(path)
        .map_err(|e| PeerError::protocol(format!("cannot open TLS private key '{path}': {e}")))?;
    let mut reader = BufReader::new(file);
    let mut rsa = rsa_private_keys(&mut reader)
        .map_err(|e| PeerError::protocol(format!("cannot parse TLS private key '{path}': {e}")))?;
    match rsa.pop() {
        Some(key) => Ok(PrivateKey(key)),
        None => Err(PeerError::protocol(format!("no private key found in '{path}'"))),
    }
}
