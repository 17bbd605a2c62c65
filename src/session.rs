//! Client-side session state machine.
//!
//! [`GameSession`] is a pure reducer over `(state, event)` and
//! `(state, intent)` pairs: every inbound [`TrilineEvent`] and every user
//! intent produces a list of [`Effect`]s and a new derived [`SessionView`].
//! The reducer never talks to a transport itself — the transport loop in
//! [`client`](crate::client) feeds it and executes the effects — which keeps
//! every transition unit-testable without I/O.
//!
//! The client is a passive reflector of authority-declared truth: it never
//! computes win/draw/legality locally. Intents that would be illegal are
//! rejected by precondition and simply produce no effects, so an
//! out-of-turn click never reaches the outbound channel.

use tracing::{debug, warn};

use crate::event::TrilineEvent;
use crate::protocol::{
    ClientMessage, ConnectionId, Difficulty, GameMode, Outcome, PlayerSymbol, SessionId,
    SessionSnapshot, NEW_SESSION_SENTINEL,
};

// ── Status messages ─────────────────────────────────────────────────

const MSG_CONNECTING: &str = "Connecting to server...";
const MSG_CREATING: &str = "Creating your game...";
const MSG_JOINING: &str = "Joining game...";
const MSG_WAITING: &str = "Waiting for another player to join...";
const MSG_CONNECTION_LOST: &str = "Connection to the server was lost.";

fn outcome_message(outcome: Outcome) -> String {
    match outcome {
        Outcome::Draw => "It's a draw!".to_string(),
        Outcome::Winner(symbol) => format!("Player {symbol} wins!"),
    }
}

// ── Configuration ───────────────────────────────────────────────────

/// Parameters for creating a new session, as chosen on a mode-selection
/// screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameConfig {
    pub game_mode: GameMode,
    /// Symbol the creator wants to play.
    pub symbol: PlayerSymbol,
    /// AI strength; only meaningful for [`GameMode::Ai`].
    pub difficulty: Option<Difficulty>,
}

impl GameConfig {
    /// Create a config for the given mode, playing the given symbol.
    pub fn new(game_mode: GameMode, symbol: PlayerSymbol) -> Self {
        Self {
            game_mode,
            symbol,
            difficulty: None,
        }
    }

    /// Set the AI difficulty.
    #[must_use]
    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = Some(difficulty);
        self
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self::new(GameMode::Online, PlayerSymbol::X)
    }
}

/// What the session state machine does once the transport connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTarget {
    /// Emit `createGame` with this config.
    Create(GameConfig),
    /// Emit `joinGame` for this existing session.
    Join(SessionId),
}

impl SessionTarget {
    /// Resolve a navigable address into a target: the
    /// [`NEW_SESSION_SENTINEL`] creates a session from `config`, anything
    /// else joins the session with that id.
    pub fn for_address(address: &str, config: Option<GameConfig>) -> Self {
        if address == NEW_SESSION_SENTINEL {
            Self::Create(config.unwrap_or_default())
        } else {
            Self::Join(address.to_string())
        }
    }
}

// ── Derived view ────────────────────────────────────────────────────

/// Lifecycle phase of the session view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Transport not yet established.
    Connecting,
    /// `createGame` emitted, awaiting `gameCreated`.
    Creating,
    /// `joinGame` emitted, awaiting the first snapshot.
    Joining,
    /// Online session with one seat filled.
    WaitingForOpponent,
    InProgress,
    /// Terminal: decided, abandoned, or disconnected. The board is inert.
    Over,
}

/// Everything a renderer needs, derived from the last snapshot. Never
/// authoritative; replaced wholesale as events arrive.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub phase: SessionPhase,
    /// Last authoritative snapshot, absent before the first one arrives.
    pub snapshot: Option<SessionSnapshot>,
    /// This connection's seat, re-derived from every snapshot.
    pub player_symbol: Option<PlayerSymbol>,
    /// Status line ("Waiting for another player to join...", outcome text,
    /// leave notices). `None` while a game is quietly in progress.
    pub message: Option<String>,
    /// This client has asked for a rematch on the current terminal session.
    pub rematch_offered: bool,
    /// The opponent has asked for a rematch.
    pub opponent_requested_rematch: bool,
}

impl SessionView {
    fn connecting() -> Self {
        Self {
            phase: SessionPhase::Connecting,
            snapshot: None,
            player_symbol: None,
            message: Some(MSG_CONNECTING.to_string()),
            rematch_offered: false,
            opponent_requested_rematch: false,
        }
    }

    /// Returns `true` once no further moves will be accepted.
    pub fn is_over(&self) -> bool {
        self.phase == SessionPhase::Over
    }
}

// ── Effects ─────────────────────────────────────────────────────────

/// Side effects requested by the reducer, executed by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Emit a message on the outbound channel.
    Send(ClientMessage),
    /// The session's navigable address changed (session was created).
    SessionAddress(SessionId),
    /// Submit a stats tally for a concluded game. Emitted at most once per
    /// terminal transition; `symbol` is `None` for an unassigned viewer.
    ReportStats {
        outcome: Outcome,
        symbol: Option<PlayerSymbol>,
    },
    /// Tear the view down and navigate away, optionally surfacing a message.
    LeaveView { message: Option<String> },
}

// ── State machine ───────────────────────────────────────────────────

/// The session state machine: owns the derived view and turns events and
/// intents into effects.
#[derive(Debug)]
pub struct GameSession {
    connection_id: ConnectionId,
    target: SessionTarget,
    session_id: Option<SessionId>,
    view: SessionView,
    /// Latch: the stats effect fired for the current terminal session.
    stats_reported: bool,
}

impl GameSession {
    /// Create a session state machine in phase `Connecting`.
    pub fn new(connection_id: ConnectionId, target: SessionTarget) -> Self {
        Self {
            connection_id,
            target,
            session_id: None,
            view: SessionView::connecting(),
            stats_reported: false,
        }
    }

    /// The derived view handed to a renderer.
    pub fn view(&self) -> &SessionView {
        &self.view
    }

    /// This connection's identity.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Id of the live session, once created or chosen for joining.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// This connection's seat, if assigned.
    pub fn player_symbol(&self) -> Option<PlayerSymbol> {
        self.view.player_symbol
    }

    // ── Inbound events ──────────────────────────────────────────────

    /// Reduce one inbound event into effects. Events are expected in
    /// server-emission order; duplicates are tolerated.
    pub fn handle_event(&mut self, event: &TrilineEvent) -> Vec<Effect> {
        match event {
            TrilineEvent::Connected => self.on_connected(),
            TrilineEvent::GameCreated {
                session_id,
                snapshot,
            } => self.on_game_created(session_id, snapshot),
            TrilineEvent::GameUpdate { snapshot } => self.on_game_update(snapshot),
            TrilineEvent::GameOver { snapshot } => self.on_game_over(snapshot),
            TrilineEvent::RematchOffer { from } => self.on_rematch_offer(*from),
            TrilineEvent::PlayerLeft { message } => self.on_player_left(message),
            TrilineEvent::ServerError { message } => self.on_server_error(message),
            TrilineEvent::Disconnected { reason } => self.on_disconnected(reason.as_deref()),
        }
    }

    fn on_connected(&mut self) -> Vec<Effect> {
        match self.target.clone() {
            SessionTarget::Create(config) => {
                self.view.phase = SessionPhase::Creating;
                self.view.message = Some(MSG_CREATING.to_string());
                vec![Effect::Send(ClientMessage::CreateGame {
                    game_mode: config.game_mode,
                    symbol: config.symbol,
                    difficulty: config.difficulty,
                    connection_id: self.connection_id,
                })]
            }
            SessionTarget::Join(session_id) => {
                self.view.phase = SessionPhase::Joining;
                self.view.message = Some(MSG_JOINING.to_string());
                self.session_id = Some(session_id.clone());
                vec![Effect::Send(ClientMessage::JoinGame {
                    game_id: session_id,
                })]
            }
        }
    }

    fn on_game_created(&mut self, session_id: &SessionId, snapshot: &SessionSnapshot) -> Vec<Effect> {
        if !matches!(
            self.view.phase,
            SessionPhase::Creating | SessionPhase::Joining
        ) {
            debug!(phase = ?self.view.phase, "ignoring gameCreated outside create/join handshake");
            return Vec::new();
        }
        self.session_id = Some(session_id.clone());
        self.adopt_snapshot(snapshot);
        if snapshot.game_mode == GameMode::Online && snapshot.players.len() == 1 {
            self.view.phase = SessionPhase::WaitingForOpponent;
            self.view.message = Some(MSG_WAITING.to_string());
        } else {
            self.view.phase = SessionPhase::InProgress;
            self.view.message = None;
        }
        vec![Effect::SessionAddress(session_id.clone())]
    }

    fn on_game_update(&mut self, snapshot: &SessionSnapshot) -> Vec<Effect> {
        // Accepted in every phase, terminal included: a rematch-created
        // session reaches both participants as a plain gameUpdate.
        self.adopt_snapshot(snapshot);
        self.view.phase = SessionPhase::InProgress;
        self.view.message = None;
        Vec::new()
    }

    fn on_game_over(&mut self, snapshot: &SessionSnapshot) -> Vec<Effect> {
        let already_over = self.view.phase == SessionPhase::Over;
        let keep_latch = self.stats_reported;
        self.adopt_snapshot(snapshot);
        self.stats_reported = keep_latch && already_over;
        self.view.phase = SessionPhase::Over;

        let Some(outcome) = snapshot.winner else {
            warn!("gameOver snapshot carries no winner; treating session as abandoned");
            self.view.message = Some("Game over.".to_string());
            return Vec::new();
        };
        self.view.message = Some(outcome_message(outcome));

        if self.stats_reported {
            return Vec::new();
        }
        self.stats_reported = true;
        vec![Effect::ReportStats {
            outcome,
            symbol: self.view.player_symbol,
        }]
    }

    fn on_rematch_offer(&mut self, from: ConnectionId) -> Vec<Effect> {
        if from == self.connection_id {
            // The authority broadcasts offers to every seat, ours included.
            return Vec::new();
        }
        if self.view.phase == SessionPhase::Over {
            self.view.opponent_requested_rematch = true;
        }
        Vec::new()
    }

    fn on_player_left(&mut self, message: &str) -> Vec<Effect> {
        self.view.message = Some(message.to_string());
        self.view.phase = SessionPhase::Over;
        Vec::new()
    }

    fn on_server_error(&mut self, message: &str) -> Vec<Effect> {
        self.view.message = Some(message.to_string());
        self.view.phase = SessionPhase::Over;
        vec![Effect::LeaveView {
            message: Some(message.to_string()),
        }]
    }

    fn on_disconnected(&mut self, reason: Option<&str>) -> Vec<Effect> {
        if self.view.phase != SessionPhase::Over {
            self.view.message = Some(reason.unwrap_or(MSG_CONNECTION_LOST).to_string());
            self.view.phase = SessionPhase::Over;
        }
        Vec::new()
    }

    /// Replace the snapshot wholesale and reset per-snapshot flags.
    fn adopt_snapshot(&mut self, snapshot: &SessionSnapshot) {
        self.view.snapshot = Some(snapshot.clone());
        self.view.rematch_offered = false;
        self.view.opponent_requested_rematch = false;
        self.stats_reported = false;
        // Keep the previous derivation when our seat is missing (e.g. a
        // snapshot observed before the authority recorded the join).
        if let Some(symbol) = snapshot.seat_of(self.connection_id) {
            self.view.player_symbol = Some(symbol);
        }
    }

    // ── User intents ────────────────────────────────────────────────

    /// A cell was clicked. Emits `makeMove` only when the session is in
    /// progress, the cell exists and is empty, and it is this player's
    /// turn — otherwise nothing reaches the outbound channel.
    pub fn click_cell(&mut self, index: usize) -> Vec<Effect> {
        if self.view.phase != SessionPhase::InProgress {
            return Vec::new();
        }
        let (Some(snapshot), Some(session_id)) = (&self.view.snapshot, &self.session_id) else {
            return Vec::new();
        };
        if !snapshot.cell_is_empty(index) {
            return Vec::new();
        }
        let Some(symbol) = self.view.player_symbol else {
            return Vec::new();
        };
        if snapshot.current_player != symbol {
            debug!(%symbol, current = %snapshot.current_player, "click out of turn, dropping");
            return Vec::new();
        }
        vec![Effect::Send(ClientMessage::MakeMove {
            game_id: session_id.clone(),
            index,
            player_symbol: symbol,
        })]
    }

    /// Ask for a rematch. Valid once per terminal session; repeated calls
    /// are no-ops until a new snapshot arrives.
    pub fn request_rematch(&mut self) -> Vec<Effect> {
        if self.view.phase != SessionPhase::Over || self.view.rematch_offered {
            return Vec::new();
        }
        let Some(session_id) = &self.session_id else {
            return Vec::new();
        };
        self.view.rematch_offered = true;
        vec![Effect::Send(ClientMessage::RequestRematch {
            game_id: session_id.clone(),
        })]
    }

    /// Leave a concluded session.
    pub fn exit(&mut self) -> Vec<Effect> {
        if self.view.phase != SessionPhase::Over {
            return Vec::new();
        }
        vec![Effect::LeaveView { message: None }]
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
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
    use crate::protocol::BOARD_CELLS;
    use uuid::Uuid;

    fn conn(n: u128) -> ConnectionId {
        Uuid::from_u128(n)
    }

    fn snapshot(seats: &[(u128, PlayerSymbol)], mode: GameMode, turn: PlayerSymbol) -> SessionSnapshot {
        SessionSnapshot {
            board: vec![None; BOARD_CELLS],
            players: seats
                .iter()
                .map(|&(id, symbol)| crate::protocol::PlayerSeat {
                    id: conn(id),
                    symbol,
                })
                .collect(),
            current_player: turn,
            game_mode: mode,
            winner: None,
            difficulty: None,
        }
    }

    fn online_creator() -> GameSession {
        GameSession::new(
            conn(1),
            SessionTarget::Create(GameConfig::new(GameMode::Online, PlayerSymbol::X)),
        )
    }

    /// Drive a machine to `InProgress` with both seats filled, conn(1) = X.
    fn in_progress() -> GameSession {
        let mut session = online_creator();
        session.handle_event(&TrilineEvent::Connected);
        let snap = snapshot(
            &[(1, PlayerSymbol::X), (2, PlayerSymbol::O)],
            GameMode::Online,
            PlayerSymbol::X,
        );
        session.handle_event(&TrilineEvent::GameCreated {
            session_id: "abc123".into(),
            snapshot: snap.clone(),
        });
        session.handle_event(&TrilineEvent::GameUpdate { snapshot: snap });
        assert_eq!(session.view().phase, SessionPhase::InProgress);
        session
    }

    fn over(winner: Outcome) -> (GameSession, Vec<Effect>) {
        let mut session = in_progress();
        let mut snap = session.view().snapshot.clone().unwrap();
        snap.winner = Some(winner);
        let effects = session.handle_event(&TrilineEvent::GameOver { snapshot: snap });
        (session, effects)
    }

    // ── Connect handshake ───────────────────────────────────────────

    #[test]
    fn connect_with_config_emits_create_game() {
        let mut session = GameSession::new(
            conn(7),
            SessionTarget::Create(
                GameConfig::new(GameMode::Ai, PlayerSymbol::O).with_difficulty(Difficulty::Hard),
            ),
        );
        let effects = session.handle_event(&TrilineEvent::Connected);
        assert_eq!(session.view().phase, SessionPhase::Creating);
        assert_eq!(
            effects,
            vec![Effect::Send(ClientMessage::CreateGame {
                game_mode: GameMode::Ai,
                symbol: PlayerSymbol::O,
                difficulty: Some(Difficulty::Hard),
                connection_id: conn(7),
            })]
        );
    }

    #[test]
    fn connect_with_join_target_emits_join_game() {
        let mut session = GameSession::new(conn(2), SessionTarget::Join("abc123".into()));
        let effects = session.handle_event(&TrilineEvent::Connected);
        assert_eq!(session.view().phase, SessionPhase::Joining);
        assert_eq!(session.session_id().map(String::as_str), Some("abc123"));
        assert_eq!(
            effects,
            vec![Effect::Send(ClientMessage::JoinGame {
                game_id: "abc123".into(),
            })]
        );
    }

    #[test]
    fn target_for_address_resolves_sentinel() {
        let created = SessionTarget::for_address(NEW_SESSION_SENTINEL, None);
        assert!(matches!(created, SessionTarget::Create(_)));
        let joined = SessionTarget::for_address("xyz789", None);
        assert_eq!(joined, SessionTarget::Join("xyz789".into()));
    }

    // ── gameCreated ─────────────────────────────────────────────────

    #[test]
    fn created_online_with_one_seat_waits_for_opponent() {
        let mut session = online_creator();
        session.handle_event(&TrilineEvent::Connected);
        let effects = session.handle_event(&TrilineEvent::GameCreated {
            session_id: "abc123".into(),
            snapshot: snapshot(&[(1, PlayerSymbol::X)], GameMode::Online, PlayerSymbol::X),
        });
        assert_eq!(session.view().phase, SessionPhase::WaitingForOpponent);
        let message = session.view().message.clone().unwrap();
        assert!(message.to_lowercase().contains("waiting"), "{message}");
        assert_eq!(session.player_symbol(), Some(PlayerSymbol::X));
        assert_eq!(effects, vec![Effect::SessionAddress("abc123".into())]);
    }

    #[test]
    fn created_ai_game_starts_immediately() {
        let mut session = GameSession::new(
            conn(1),
            SessionTarget::Create(GameConfig::new(GameMode::Ai, PlayerSymbol::X)),
        );
        session.handle_event(&TrilineEvent::Connected);
        session.handle_event(&TrilineEvent::GameCreated {
            session_id: "ai1".into(),
            snapshot: snapshot(&[(1, PlayerSymbol::X)], GameMode::Ai, PlayerSymbol::X),
        });
        assert_eq!(session.view().phase, SessionPhase::InProgress);
        assert_eq!(session.view().message, None);
    }

    #[test]
    fn created_outside_handshake_is_ignored() {
        let mut session = in_progress();
        let before = session.view().clone();
        let effects = session.handle_event(&TrilineEvent::GameCreated {
            session_id: "other".into(),
            snapshot: snapshot(&[(9, PlayerSymbol::O)], GameMode::Online, PlayerSymbol::O),
        });
        assert!(effects.is_empty());
        assert_eq!(*session.view(), before);
        assert_eq!(session.session_id().map(String::as_str), Some("abc123"));
    }

    // ── gameUpdate ──────────────────────────────────────────────────

    #[test]
    fn joiner_derives_opposite_symbol() {
        let mut session = GameSession::new(conn(2), SessionTarget::Join("abc123".into()));
        session.handle_event(&TrilineEvent::Connected);
        session.handle_event(&TrilineEvent::GameUpdate {
            snapshot: snapshot(
                &[(1, PlayerSymbol::X), (2, PlayerSymbol::O)],
                GameMode::Online,
                PlayerSymbol::X,
            ),
        });
        assert_eq!(session.view().phase, SessionPhase::InProgress);
        assert_eq!(session.player_symbol(), Some(PlayerSymbol::O));
    }

    #[test]
    fn update_is_idempotent() {
        let mut session = in_progress();
        let snap = session.view().snapshot.clone().unwrap();
        session.handle_event(&TrilineEvent::GameUpdate {
            snapshot: snap.clone(),
        });
        let first = session.view().clone();
        session.handle_event(&TrilineEvent::GameUpdate { snapshot: snap });
        assert_eq!(*session.view(), first);
    }

    #[test]
    fn symbol_derivation_is_order_independent() {
        let forward = snapshot(
            &[(1, PlayerSymbol::X), (2, PlayerSymbol::O)],
            GameMode::Online,
            PlayerSymbol::X,
        );
        let reversed = snapshot(
            &[(2, PlayerSymbol::O), (1, PlayerSymbol::X)],
            GameMode::Online,
            PlayerSymbol::X,
        );
        for snap in [forward, reversed] {
            let mut session = GameSession::new(conn(1), SessionTarget::Join("abc123".into()));
            session.handle_event(&TrilineEvent::Connected);
            session.handle_event(&TrilineEvent::GameUpdate { snapshot: snap });
            assert_eq!(session.player_symbol(), Some(PlayerSymbol::X));
        }
    }

    #[test]
    fn update_reflects_authoritative_move() {
        let mut session = in_progress();
        let mut snap = session.view().snapshot.clone().unwrap();
        snap.board[4] = Some(PlayerSymbol::X);
        snap.current_player = PlayerSymbol::O;
        session.handle_event(&TrilineEvent::GameUpdate { snapshot: snap });
        let view = session.view();
        let board = &view.snapshot.as_ref().unwrap().board;
        assert_eq!(board[4], Some(PlayerSymbol::X));
        assert_eq!(
            view.snapshot.as_ref().unwrap().current_player,
            PlayerSymbol::O
        );
    }

    // ── Cell clicks ─────────────────────────────────────────────────

    #[test]
    fn click_in_turn_emits_make_move() {
        let mut session = in_progress();
        let effects = session.click_cell(4);
        assert_eq!(
            effects,
            vec![Effect::Send(ClientMessage::MakeMove {
                game_id: "abc123".into(),
                index: 4,
                player_symbol: PlayerSymbol::X,
            })]
        );
    }

    #[test]
    fn click_out_of_turn_emits_nothing() {
        let mut session = in_progress();
        let mut snap = session.view().snapshot.clone().unwrap();
        snap.current_player = PlayerSymbol::O;
        session.handle_event(&TrilineEvent::GameUpdate { snapshot: snap });
        assert!(session.click_cell(4).is_empty());
    }

    #[test]
    fn click_on_occupied_cell_emits_nothing() {
        let mut session = in_progress();
        let mut snap = session.view().snapshot.clone().unwrap();
        snap.board[4] = Some(PlayerSymbol::O);
        session.handle_event(&TrilineEvent::GameUpdate { snapshot: snap });
        assert!(session.click_cell(4).is_empty());
    }

    #[test]
    fn click_out_of_bounds_emits_nothing() {
        let mut session = in_progress();
        assert!(session.click_cell(BOARD_CELLS).is_empty());
    }

    #[test]
    fn click_while_waiting_emits_nothing() {
        let mut session = online_creator();
        session.handle_event(&TrilineEvent::Connected);
        session.handle_event(&TrilineEvent::GameCreated {
            session_id: "abc123".into(),
            snapshot: snapshot(&[(1, PlayerSymbol::X)], GameMode::Online, PlayerSymbol::X),
        });
        assert!(session.click_cell(0).is_empty());
    }

    #[test]
    fn click_after_game_over_emits_nothing() {
        let (mut session, _) = over(Outcome::Winner(PlayerSymbol::X));
        assert!(session.click_cell(8).is_empty());
    }

    // ── gameOver ────────────────────────────────────────────────────

    #[test]
    fn win_sets_message_and_reports_stats() {
        let (session, effects) = over(Outcome::Winner(PlayerSymbol::X));
        assert_eq!(session.view().phase, SessionPhase::Over);
        assert_eq!(session.view().message.as_deref(), Some("Player X wins!"));
        assert_eq!(
            effects,
            vec![Effect::ReportStats {
                outcome: Outcome::Winner(PlayerSymbol::X),
                symbol: Some(PlayerSymbol::X),
            }]
        );
    }

    #[test]
    fn draw_sets_message_and_reports_stats() {
        let (session, effects) = over(Outcome::Draw);
        assert_eq!(session.view().message.as_deref(), Some("It's a draw!"));
        assert_eq!(
            effects,
            vec![Effect::ReportStats {
                outcome: Outcome::Draw,
                symbol: Some(PlayerSymbol::X),
            }]
        );
    }

    #[test]
    fn duplicate_game_over_reports_stats_once() {
        let (mut session, first) = over(Outcome::Winner(PlayerSymbol::O));
        assert_eq!(first.len(), 1);
        let snap = session.view().snapshot.clone().unwrap();
        let second = session.handle_event(&TrilineEvent::GameOver { snapshot: snap });
        assert!(second.is_empty());
    }

    #[test]
    fn unassigned_viewer_reports_stats_without_symbol() {
        let mut session = GameSession::new(conn(99), SessionTarget::Join("abc123".into()));
        session.handle_event(&TrilineEvent::Connected);
        let mut snap = snapshot(
            &[(1, PlayerSymbol::X), (2, PlayerSymbol::O)],
            GameMode::Online,
            PlayerSymbol::X,
        );
        session.handle_event(&TrilineEvent::GameUpdate {
            snapshot: snap.clone(),
        });
        snap.winner = Some(Outcome::Draw);
        let effects = session.handle_event(&TrilineEvent::GameOver { snapshot: snap });
        assert_eq!(
            effects,
            vec![Effect::ReportStats {
                outcome: Outcome::Draw,
                symbol: None,
            }]
        );
    }

    // ── Rematch negotiation ─────────────────────────────────────────

    #[test]
    fn rematch_request_is_latched() {
        let (mut session, _) = over(Outcome::Draw);
        let first = session.request_rematch();
        assert_eq!(
            first,
            vec![Effect::Send(ClientMessage::RequestRematch {
                game_id: "abc123".into(),
            })]
        );
        assert!(session.view().rematch_offered);
        assert!(session.request_rematch().is_empty());
    }

    #[test]
    fn rematch_request_before_game_over_is_rejected() {
        let mut session = in_progress();
        assert!(session.request_rematch().is_empty());
        assert!(!session.view().rematch_offered);
    }

    #[test]
    fn rematch_offer_from_self_is_ignored() {
        let (mut session, _) = over(Outcome::Draw);
        session.handle_event(&TrilineEvent::RematchOffer { from: conn(1) });
        assert!(!session.view().opponent_requested_rematch);
    }

    #[test]
    fn rematch_offer_from_opponent_sets_flag() {
        let (mut session, _) = over(Outcome::Draw);
        session.handle_event(&TrilineEvent::RematchOffer { from: conn(2) });
        assert!(session.view().opponent_requested_rematch);
    }

    #[test]
    fn rematch_snapshot_restarts_the_session() {
        let (mut session, _) = over(Outcome::Winner(PlayerSymbol::O));
        session.request_rematch();
        session.handle_event(&TrilineEvent::RematchOffer { from: conn(2) });

        // Both agreed; the authority replaces the session wholesale.
        let fresh = snapshot(
            &[(1, PlayerSymbol::X), (2, PlayerSymbol::O)],
            GameMode::Online,
            PlayerSymbol::X,
        );
        session.handle_event(&TrilineEvent::GameUpdate {
            snapshot: fresh.clone(),
        });
        let view = session.view();
        assert_eq!(view.phase, SessionPhase::InProgress);
        assert!(!view.rematch_offered);
        assert!(!view.opponent_requested_rematch);
        assert_eq!(view.message, None);

        // The stats latch reset with the new session.
        let mut done = fresh;
        done.winner = Some(Outcome::Winner(PlayerSymbol::X));
        let effects = session.handle_event(&TrilineEvent::GameOver { snapshot: done });
        assert_eq!(effects.len(), 1);
    }

    // ── Departure and failure paths ─────────────────────────────────

    #[test]
    fn player_left_forces_terminal_without_stats() {
        let mut session = in_progress();
        let effects = session.handle_event(&TrilineEvent::PlayerLeft {
            message: "Opponent left the game".into(),
        });
        assert!(effects.is_empty());
        assert_eq!(session.view().phase, SessionPhase::Over);
        assert_eq!(
            session.view().message.as_deref(),
            Some("Opponent left the game")
        );
        assert!(session.click_cell(0).is_empty());
    }

    #[test]
    fn server_error_leaves_the_view() {
        let mut session = in_progress();
        let effects = session.handle_event(&TrilineEvent::ServerError {
            message: "Game not found".into(),
        });
        assert_eq!(
            effects,
            vec![Effect::LeaveView {
                message: Some("Game not found".into()),
            }]
        );
        assert_eq!(session.view().phase, SessionPhase::Over);
    }

    #[test]
    fn disconnect_mid_game_forces_terminal() {
        let mut session = in_progress();
        session.handle_event(&TrilineEvent::Disconnected { reason: None });
        assert_eq!(session.view().phase, SessionPhase::Over);
        assert!(session.view().message.is_some());
        assert!(session.click_cell(0).is_empty());
    }

    #[test]
    fn disconnect_after_game_over_keeps_outcome_message() {
        let (mut session, _) = over(Outcome::Winner(PlayerSymbol::X));
        session.handle_event(&TrilineEvent::Disconnected { reason: None });
        assert_eq!(session.view().message.as_deref(), Some("Player X wins!"));
    }

    #[test]
    fn exit_is_only_valid_when_over() {
        let mut session = in_progress();
        assert!(session.exit().is_empty());
        let (mut session, _) = over(Outcome::Draw);
        assert_eq!(session.exit(), vec![Effect::LeaveView { message: None }]);
    }
}
