//! WebSocket transport backed by `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] speaks the Triline session protocol over a
//! WebSocket connection. Both `ws://` and `wss://` URLs work; TLS is
//! negotiated transparently through
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! Available with the default `transport-websocket` feature.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::TrilineError;
use crate::transport::Transport;

/// The underlying WebSocket stream type.
///
/// Public so callers with custom connection needs (TLS config, proxies,
/// extra headers) can build the stream themselves and wrap it via
/// [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] over a WebSocket connection to the session authority.
///
/// Protocol messages travel as text frames. Control frames are handled
/// inside [`recv`](Transport::recv): pings are answered automatically by
/// tungstenite, pongs are dropped, and a close frame ends the stream.
/// `recv` is cancel-safe and may be polled inside `tokio::select!`.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Connect to the authority at the given `ws://` or `wss://` URL.
    ///
    /// # Errors
    ///
    /// Returns [`TrilineError::Io`] when the URL is invalid or the
    /// connection cannot be established; an underlying I/O error keeps its
    /// [`ErrorKind`](std::io::ErrorKind).
    pub async fn connect(url: &str) -> Result<Self, TrilineError> {
        tracing::debug!(url = %url, "connecting to session authority");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            TrilineError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %url, "WebSocket connection established");

        Ok(Self {
            stream,
            closed: false,
        })
    }

    /// Like [`connect`](Self::connect), but bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TrilineError::Timeout`] when the deadline elapses, or any
    /// error [`connect`](Self::connect) can return.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, TrilineError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| TrilineError::Timeout)?
    }

    /// Wrap an already-established WebSocket stream.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), TrilineError> {
        if self.closed {
            return Err(TrilineError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| TrilineError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, TrilineError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(TrilineError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "authority sent close frame");
                    return None;
                }
                // tungstenite queues the pong reply itself; nothing to do
                // for either ping or pong but keep reading.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(_) => {
                    tracing::warn!("unexpected binary frame on text protocol, skipping");
                }
                Message::Frame(_) => {
                    // Never produced by the read half; kept for
                    // exhaustiveness.
                    tracing::debug!("raw frame variant, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TrilineError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| TrilineError::TransportSend(e.to_string()))
    }
}

#[cfg(test)]
#[cfg(feature = "transport-websocket")]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Run `handler` against the first accepted WebSocket connection and
    /// return the URL to dial.
    async fn local_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn connect_rejects_invalid_url() {
        let err = WebSocketTransport::connect("not-a-url").await.unwrap_err();
        assert!(matches!(err, TrilineError::Io(_)));
    }

    #[tokio::test]
    async fn connect_with_timeout_gives_up() {
        // Non-routable TEST-NET address guarantees the dial hangs.
        let err = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            std::time::Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TrilineError::Timeout));
    }

    #[tokio::test]
    async fn recv_yields_text_messages_in_order() {
        let url = local_server(|mut ws| async move {
            ws.send(Message::Text("first".into())).await.unwrap();
            ws.send(Message::Text("second".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "first");
        assert_eq!(transport.recv().await.unwrap().unwrap(), "second");
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_skips_binary_frames() {
        let url = local_server(|mut ws| async move {
            ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
            ws.send(Message::Text("text".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "text");
    }

    #[tokio::test]
    async fn send_round_trip() {
        let url = local_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.send("echo-me".to_string()).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "echo-me");
    }

    #[tokio::test]
    async fn send_after_close_is_rejected() {
        let url =
            local_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} }).await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        // Close must also be idempotent.
        transport.close().await.unwrap();

        let err = transport.send("late".to_string()).await.unwrap_err();
        assert!(matches!(err, TrilineError::TransportClosed));
    }

    #[tokio::test]
    async fn from_stream_wraps_an_existing_connection() {
        let url = local_server(|mut ws| async move {
            ws.send(Message::Text("wrapped".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let (stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let mut transport = WebSocketTransport::from_stream(stream);
        assert_eq!(transport.recv().await.unwrap().unwrap(), "wrapped");
    }
}
