//! # Triline Client
//!
//! Transport-agnostic Rust client for the Triline turn-based game session
//! protocol.
//!
//! The session authority owns every game: it validates moves, decides
//! outcomes, and broadcasts full state snapshots. This crate is the client
//! half — it creates or joins a session, reflects authority snapshots into a
//! renderable view, and turns user intents into protocol messages.
//!
//! ## Features
//!
//! - **Transport-agnostic** — implement the [`Transport`] trait for any
//!   bidirectional text-message backend
//! - **WebSocket built-in** — the default `transport-websocket` feature
//!   provides [`WebSocketTransport`]
//! - **Authority-driven** — the [`GameSession`] state machine is a pure
//!   reducer over inbound events; the client never computes game rules
//! - **Event-driven** — consumers receive typed [`TrilineEvent`]s via a
//!   channel and read the derived [`SessionView`] from the handle
//! - **Side channel included** — the default `stats-http` feature provides
//!   [`api::ApiClient`] for login, registration, and fire-and-forget stats
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! let transport = WebSocketTransport::connect("ws://localhost:5000/game").await?;
//! let config = TrilineConfig::create(GameConfig::new(GameMode::Online, PlayerSymbol::X));
//! let (client, mut events) = TrilineClient::start(transport, config);
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         TrilineEvent::GameUpdate { .. } => { /* redraw */ }
//!         TrilineEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

pub mod client;
pub mod error;
pub mod event;
pub mod protocol;
pub mod session;
pub mod stats;
pub mod transport;

#[cfg(feature = "stats-http")]
pub mod api;

pub mod transports;

// Re-export primary types for ergonomic imports.
pub use client::{TrilineClient, TrilineConfig};
pub use error::TrilineError;
pub use event::TrilineEvent;
pub use protocol::{ClientMessage, GameMode, Outcome, PlayerSymbol, ServerMessage};
pub use session::{Effect, GameConfig, GameSession, SessionPhase, SessionTarget, SessionView};
pub use stats::{StatsReporter, StatsSink, StatsTally};
pub use transport::Transport;

#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
