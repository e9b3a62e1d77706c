use thiserror::Error;

pub type PeerResult<T> = Result<T, PeerError>;

/// Error kinds as laid out by the protocol's error-handling design: transient
/// I/O is retried by the caller, everything else here is connection-fatal or
/// advisory and is handled by closing/logging at the transport layer.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("handshake error: {0}")]
    Handshake(String),

    #[error("peer timed out: {0}")]
    Timeout(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("operation canceled")]
    Canceled,
}

impl PeerError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        PeerError::Protocol(msg.into())
    }

    pub fn handshake(msg: impl Into<String>) -> Self {
        PeerError::Handshake(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        PeerError::Timeout(msg.into())
    }

    pub fn registry(msg: impl Into<String>) -> Self {
        PeerError::Registry(msg.into())
    }

    /// True for errors that should close the connection/peer rather than
    /// merely being logged and dropped.
    pub fn is_connection_fatal(&self) -> bool {
        !matches!(self, PeerError::Canceled)
    }
}

impl From<String> for PeerError {
    fn from(msg: String) -> Self {
        PeerError::Protocol(msg)
    }
}

impl From<&str> for PeerError {
    fn from(msg: &str) -> Self {
        PeerError::Protocol(msg.to_string())
    }
}
