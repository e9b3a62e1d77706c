//! Thin marker for the HTTP transport binding named in spec.md §2/§4.4.
//! A full implementation is out of this core's depth (spec.md §1 scopes
//! "higher-level JSON/HTTP/WebSocket service handlers" to external
//! collaborators) — this type only exists so a connection can be attached
//! to an HTTP binding through the same [`super::Transport`] surface the
//! message transport uses, the way the teacher's factory-per-transport
//! pattern would wire in a second protocol without the scheduler knowing
//! the difference.

use super::{Transport, TransportKind};

pub struct HttpTransport;

impl Transport for HttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }
}
