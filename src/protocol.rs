//! Wire-compatible protocol types for the Triline game session protocol.
//!
//! Every type in this module produces identical JSON to the session
//! authority's wire format: camelCase field names inside an
//! `{"type": ..., "data": ...}` envelope. The board is an array of nine
//! `"X" | "O" | null` cells and the winner field is `"X" | "O" | "draw"`.
//!
//! The authority broadcasts a full [`SessionSnapshot`] after every accepted
//! mutation; clients never receive deltas.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Identifiers ─────────────────────────────────────────────────────

/// Identity of one transport connection, generated client-side and carried
/// in `createGame`. The authority echoes it back inside `players`, which is
/// how a client recognizes its own seat.
pub type ConnectionId = Uuid;

/// Opaque session identifier minted by the authority at creation.
///
/// Short and shareable — a second participant joins by presenting it.
pub type SessionId = String;

/// Sentinel session id meaning "no session exists yet, create one".
pub const NEW_SESSION_SENTINEL: &str = "new";

/// Number of cells on the board.
pub const BOARD_CELLS: usize = 9;

// ── Enums ───────────────────────────────────────────────────────────

/// A player's marker within a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PlayerSymbol {
    X,
    O,
}

impl PlayerSymbol {
    /// Returns the other symbol.
    pub fn opponent(self) -> Self {
        match self {
            Self::X => Self::O,
            Self::O => Self::X,
        }
    }
}

impl fmt::Display for PlayerSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X => write!(f, "X"),
            Self::O => write!(f, "O"),
        }
    }
}

/// How a session is populated, fixed at creation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Two players sharing one connection.
    Local,
    /// One player versus the authority's AI engine.
    Ai,
    /// Two players on separate connections.
    #[default]
    Online,
}

/// AI opponent strength, meaningful only for [`GameMode::Ai`] sessions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

/// The decided result of a terminal session.
///
/// Wire format: bare `"X"`, `"O"`, or `"draw"` — the draw marker shares the
/// value space with the winning symbol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Outcome {
    #[serde(rename = "draw")]
    Draw,
    #[serde(untagged)]
    Winner(PlayerSymbol),
}

// ── Structs ─────────────────────────────────────────────────────────

/// One occupied seat in a session: which connection holds which symbol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSeat {
    pub id: ConnectionId,
    pub symbol: PlayerSymbol,
}

/// Full session state as broadcast by the authority.
///
/// This is the client's only source of truth. It is replaced wholesale on
/// every inbound `gameUpdate`/`gameOver`; the client never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Nine cells in row-major order; `None` is empty.
    pub board: Vec<Option<PlayerSymbol>>,
    /// At most two seats. Grows on join, never shrinks while live.
    pub players: Vec<PlayerSeat>,
    /// Symbol whose move the authority will accept next.
    pub current_player: PlayerSymbol,
    pub game_mode: GameMode,
    /// Write-once: present exactly when the session is terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Outcome>,
    /// AI strength chosen at creation (AI sessions only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
}

impl SessionSnapshot {
    /// Derive the symbol held by `id` by rescanning `players`.
    ///
    /// The connection id is the only correlation key that survives
    /// reconnects, so callers re-derive on every snapshot instead of
    /// caching.
    pub fn seat_of(&self, id: ConnectionId) -> Option<PlayerSymbol> {
        self.players.iter().find(|p| p.id == id).map(|p| p.symbol)
    }

    /// Returns `true` if `index` addresses a cell that exists and is empty.
    pub fn cell_is_empty(&self, index: usize) -> bool {
        matches!(self.board.get(index), Some(None))
    }

    /// Returns `true` once a winner or draw has been decided.
    pub fn is_terminal(&self) -> bool {
        self.winner.is_some()
    }
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to the session authority.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Create a new session from a mode-selection config.
    #[serde(rename_all = "camelCase")]
    CreateGame {
        game_mode: GameMode,
        /// Symbol the creator wants to play.
        symbol: PlayerSymbol,
        /// Always present on the wire; `null` for non-AI modes.
        difficulty: Option<Difficulty>,
        connection_id: ConnectionId,
    },
    /// Join an existing session by id.
    #[serde(rename_all = "camelCase")]
    JoinGame { game_id: SessionId },
    /// Place a symbol on a cell. The authority validates; the client only
    /// pre-filters obviously illegal intents.
    #[serde(rename_all = "camelCase")]
    MakeMove {
        game_id: SessionId,
        index: usize,
        player_symbol: PlayerSymbol,
    },
    /// Ask to replay the same matchup after a terminal state.
    #[serde(rename_all = "camelCase")]
    RequestRematch { game_id: SessionId },
}

/// Message types sent from the session authority to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    /// A session was created for this connection.
    #[serde(rename_all = "camelCase")]
    GameCreated {
        game_id: SessionId,
        game_state: SessionSnapshot,
    },
    /// Authoritative snapshot after an accepted mutation or a join.
    GameUpdate(SessionSnapshot),
    /// Final snapshot; `winner` is set.
    GameOver(SessionSnapshot),
    /// Broadcast when a participant requests a rematch.
    #[serde(rename_all = "camelCase")]
    RematchOffer { player: ConnectionId },
    /// The other participant's connection went away.
    #[serde(rename_all = "camelCase")]
    PlayerLeft { message: String },
    /// The authority rejected an intent or the session is unusable.
    Error { message: String },
}
