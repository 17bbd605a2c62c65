//! Error types for the Triline client.

use thiserror::Error;

/// Errors that can occur when using the Triline client.
#[derive(Debug, Error)]
pub enum TrilineError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active connection, but the client is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// Attempted a session operation before a session was created or joined.
    #[error("no active game session")]
    NoActiveSession,

    /// The side channel requires a bearer credential that is not held.
    #[error("not authenticated")]
    Unauthenticated,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An HTTP side-channel request failed.
    #[cfg(feature = "stats-http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A specialized [`Result`] type for Triline client operations.
pub type Result<T> = std::result::Result<T, TrilineError>;
