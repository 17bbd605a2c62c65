//! Transport implementations for the Triline session protocol.
//!
//! Concrete [`Transport`](crate::Transport) implementations live behind
//! feature gates:
//!
//! | Feature                | Transport              |
//! |------------------------|------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`] |

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::WebSocketTransport;
