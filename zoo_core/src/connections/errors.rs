use thiserror::Error;

/// A central error enum for connection-related errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The coordination-service client could not open a session.
    #[error("connect error: {0}")]
    Connect(String),
    /// The SSH tunnel could not be established (TCP, handshake, auth or bind).
    #[error("tunnel error: {0}")]
    Tunnel(String),
    #[error("'{0}' is already connected")]
    AlreadyConnected(String),
    #[error("no session for '{0}'")]
    NoSession(String),
}

impl ConnectionError {
    pub fn is_tunnel(&self) -> bool {
        matches!(self, ConnectionError::Tunnel(_))
    }
}
