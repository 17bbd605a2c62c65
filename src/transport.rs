//! Transport abstraction for the Triline session protocol.
//!
//! The [`Transport`] trait is a bidirectional text-message channel between a
//! client and the session authority. The protocol itself is JSON text, so an
//! implementation only has to deliver whole messages in order — framing is
//! the transport's concern (WebSocket frames, length-prefixed TCP, and so
//! on).
//!
//! Connection setup is intentionally not part of the trait: different
//! transports need different parameters (a URL, a host:port pair, an
//! in-process channel). Construct a connected transport first, then hand it
//! to [`TrilineClient::start`](crate::client::TrilineClient::start).

use async_trait::async_trait;

use crate::error::TrilineError;

/// A bidirectional text message transport for the Triline session protocol.
///
/// Implementors shuttle serialized JSON strings between client and
/// authority. Each [`send`](Transport::send) transmits one complete message;
/// each [`recv`](Transport::recv) yields one complete message.
///
/// # Object Safety
///
/// The trait is object-safe, so `Box<dyn Transport>` works where dynamic
/// dispatch is needed; `TrilineClient::start` takes `impl Transport` for the
/// common monomorphized case.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **must** be cancel-safe: it is polled inside
/// `tokio::select!`, and a cancelled call must not lose a message.
/// Channel-backed implementations are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one JSON text message to the authority.
    ///
    /// # Errors
    ///
    /// Returns [`TrilineError::TransportSend`] if the message could not be
    /// transmitted.
    async fn send(&mut self, message: String) -> Result<(), TrilineError>;

    /// Receive the next JSON text message from the authority.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — one complete message
    /// - `Some(Err(e))` — a transport fault
    /// - `None` — the connection closed cleanly
    ///
    /// # Cancel Safety
    ///
    /// Must be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<String, TrilineError>>;

    /// Close the connection gracefully. Implementations should release
    /// resources even when the close handshake fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails.
    async fn close(&mut self) -> Result<(), TrilineError>;
}
