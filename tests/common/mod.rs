#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for Triline client integration tests.
//!
//! Provides a scripted [`MockTransport`] plus helpers for building the JSON
//! the session authority would emit.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use triline_client::protocol::{
    ConnectionId, GameMode, Outcome, PlayerSeat, PlayerSymbol, ServerMessage, SessionSnapshot,
    BOARD_CELLS,
};
use triline_client::{Transport, TrilineError};

// ── MockTransport ───────────────────────────────────────────────────

/// A scripted mock transport for integration testing.
///
/// Authority responses are consumed in order by `recv()`; once exhausted the
/// transport stays open until shutdown. Everything the client sends is
/// recorded in `sent`.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, TrilineError>>>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a mock transport with the given scripted responses. Returns
    /// the transport plus shared handles for inspecting sent messages and
    /// the close flag.
    pub fn new(
        incoming: Vec<Option<Result<String, TrilineError>>>,
    ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), TrilineError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, TrilineError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // Script exhausted — keep the connection open until shutdown.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), TrilineError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── ChannelTransport ────────────────────────────────────────────────

/// A transport fed interactively from the test body, for flows where the
/// authority's response must land *after* a user intent.
pub struct ChannelTransport {
    rx: tokio::sync::mpsc::UnboundedReceiver<Result<String, TrilineError>>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl ChannelTransport {
    /// Returns the transport, a sender for authority messages (dropping it
    /// closes the connection cleanly), and the shared inspection handles.
    #[allow(clippy::type_complexity)]
    pub fn new() -> (
        Self,
        tokio::sync::mpsc::UnboundedSender<Result<String, TrilineError>>,
        Arc<StdMutex<Vec<String>>>,
        Arc<AtomicBool>,
    ) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            rx,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, tx, sent, closed)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, message: String) -> Result<(), TrilineError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, TrilineError>> {
        // `None` when the test drops the sender: a clean authority close.
        self.rx.recv().await
    }

    async fn close(&mut self) -> Result<(), TrilineError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── Snapshot builders ───────────────────────────────────────────────

/// A deterministic connection id for tests.
pub fn conn(n: u128) -> ConnectionId {
    ConnectionId::from_u128(n)
}

/// An in-progress snapshot with an empty board.
pub fn snapshot(
    seats: &[(ConnectionId, PlayerSymbol)],
    mode: GameMode,
    turn: PlayerSymbol,
) -> SessionSnapshot {
    SessionSnapshot {
        board: vec![None; BOARD_CELLS],
        players: seats
            .iter()
            .map(|&(id, symbol)| PlayerSeat { id, symbol })
            .collect(),
        current_player: turn,
        game_mode: mode,
        winner: None,
        difficulty: None,
    }
}

/// A fully-seated online snapshot: `a` plays X, `b` plays O, X to move.
pub fn two_player_snapshot(a: ConnectionId, b: ConnectionId) -> SessionSnapshot {
    snapshot(
        &[(a, PlayerSymbol::X), (b, PlayerSymbol::O)],
        GameMode::Online,
        PlayerSymbol::X,
    )
}

// ── Authority JSON helpers ──────────────────────────────────────────

pub fn game_created_json(session_id: &str, snap: &SessionSnapshot) -> String {
    serde_json::to_string(&ServerMessage::GameCreated {
        game_id: session_id.into(),
        game_state: snap.clone(),
    })
    .expect("game_created_json serialization")
}

pub fn game_update_json(snap: &SessionSnapshot) -> String {
    serde_json::to_string(&ServerMessage::GameUpdate(snap.clone()))
        .expect("game_update_json serialization")
}

/// Terminal snapshot with the given outcome.
pub fn game_over_json(snap: &SessionSnapshot, outcome: Outcome) -> String {
    let mut snap = snap.clone();
    snap.winner = Some(outcome);
    serde_json::to_string(&ServerMessage::GameOver(snap)).expect("game_over_json serialization")
}

pub fn rematch_offer_json(player: ConnectionId) -> String {
    serde_json::to_string(&ServerMessage::RematchOffer { player })
        .expect("rematch_offer_json serialization")
}

pub fn player_left_json(message: &str) -> String {
    serde_json::to_string(&ServerMessage::PlayerLeft {
        message: message.into(),
    })
    .expect("player_left_json serialization")
}

pub fn error_json(message: &str) -> String {
    serde_json::to_string(&ServerMessage::Error {
        message: message.into(),
    })
    .expect("error_json serialization")
}
