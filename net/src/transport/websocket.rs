//! Thin marker for the WebSocket transport binding named in spec.md
//! §2/§4.4. Out of depth for the same reason as [`super::http`]; a real
//! implementation would frame over `tokio-tungstenite` the way
//! `chia-client`'s connection layer does for its light-client protocol,
//! but that framing is a service-layer concern this core doesn't own.

use super::{Transport, TransportKind};

pub struct WebSocketTransport;

impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }
}
