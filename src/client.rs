//! Async client for the Triline game session protocol.
//!
//! [`TrilineClient`] is a thin handle over a background transport loop. The
//! loop owns the [`GameSession`] state machine and runs as a cooperative
//! reactor: each inbound authority event and each user intent is reduced to
//! completion before the next is processed, so the derived view never races.
//! Intents are validated by the state machine inside the loop — an
//! out-of-turn click is dropped there and never reaches the wire.
//!
//! Consumers receive [`TrilineEvent`]s on a bounded channel and read the
//! derived [`SessionView`] through the handle.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = WebSocketTransport::connect("ws://localhost:5000/game").await?;
//! let config = TrilineConfig::create(GameConfig::new(GameMode::Online, PlayerSymbol::X));
//! let (client, mut events) = TrilineClient::start(transport, config);
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         TrilineEvent::GameUpdate { .. } => { /* redraw from client.view().await */ }
//!         TrilineEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, warn};

use crate::error::{Result, TrilineError};
use crate::event::TrilineEvent;
use crate::protocol::{ConnectionId, PlayerSymbol, ServerMessage, SessionId};
use crate::session::{Effect, GameConfig, GameSession, SessionTarget, SessionView};
use crate::stats::StatsReporter;
use crate::transport::Transport;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`TrilineClient`].
///
/// Built from a [`SessionTarget`]: either create a session from a
/// [`GameConfig`] or join an existing one by id. A fresh [`ConnectionId`] is
/// generated unless one is supplied.
///
/// # Example
///
/// ```
/// use triline_client::client::TrilineConfig;
/// use triline_client::session::GameConfig;
/// use triline_client::protocol::{GameMode, PlayerSymbol};
///
/// let config = TrilineConfig::create(GameConfig::new(GameMode::Online, PlayerSymbol::X))
///     .with_event_channel_capacity(256);
/// assert_eq!(config.event_channel_capacity, 256);
/// ```
#[derive(Debug, Clone)]
pub struct TrilineConfig {
    /// This connection's identity, carried in `createGame` and matched
    /// against `players` to derive the own symbol.
    pub connection_id: ConnectionId,
    /// What to do once the transport connects.
    pub target: SessionTarget,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up, events are dropped with a warning
    /// rather than blocking the reactor. The final `Disconnected` event is
    /// always delivered. Defaults to **128**; values below 1 are clamped.
    pub event_channel_capacity: usize,
    /// How long [`TrilineClient::shutdown`] waits for the loop to close the
    /// transport before aborting it. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl TrilineConfig {
    /// Configuration that creates a new session from `game`.
    pub fn create(game: GameConfig) -> Self {
        Self::new(SessionTarget::Create(game))
    }

    /// Configuration that joins the existing session `session_id`.
    pub fn join(session_id: impl Into<SessionId>) -> Self {
        Self::new(SessionTarget::Join(session_id.into()))
    }

    /// Configuration for an explicit target.
    pub fn new(target: SessionTarget) -> Self {
        Self {
            connection_id: ConnectionId::new_v4(),
            target,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Use a caller-supplied connection identity.
    #[must_use]
    pub fn with_connection_id(mut self, connection_id: ConnectionId) -> Self {
        self.connection_id = connection_id;
        self
    }

    /// Set the event channel capacity. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the graceful shutdown timeout.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Intents ─────────────────────────────────────────────────────────

/// User intents queued to the reactor. Validation happens there, against
/// the current view, not at the call site.
#[derive(Debug)]
enum Intent {
    ClickCell(usize),
    RequestRematch,
    Exit,
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the client handle and the reactor.
struct SharedState {
    connected: AtomicBool,
    session_id: Mutex<Option<SessionId>>,
    view: Mutex<SessionView>,
}

impl SharedState {
    fn new(view: SessionView) -> Self {
        Self {
            connected: AtomicBool::new(true),
            session_id: Mutex::new(None),
            view: Mutex::new(view),
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to one live game session connection.
///
/// Created via [`TrilineClient::start`], which spawns the background
/// reactor and returns this handle together with the event receiver. Intent
/// methods return immediately once the intent is queued; whether anything
/// goes out on the wire is decided by the session state machine.
pub struct TrilineClient {
    intent_tx: mpsc::UnboundedSender<Intent>,
    state: Arc<SharedState>,
    connection_id: ConnectionId,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl TrilineClient {
    /// Start the reactor without stats reporting.
    ///
    /// See [`start_with_stats`](Self::start_with_stats).
    #[must_use = "the event receiver must be consumed to observe the session"]
    pub fn start(
        transport: impl Transport,
        config: TrilineConfig,
    ) -> (Self, mpsc::Receiver<TrilineEvent>) {
        Self::start_with_stats(transport, config, StatsReporter::disabled())
    }

    /// Start the reactor and return a handle plus event receiver.
    ///
    /// The reactor immediately feeds the synthetic `Connected` event to the
    /// session state machine, which emits `createGame` or `joinGame`
    /// according to `config.target`. `stats` is invoked exactly once per
    /// concluded game.
    #[must_use = "the event receiver must be consumed to observe the session"]
    pub fn start_with_stats(
        transport: impl Transport,
        config: TrilineConfig,
        stats: StatsReporter,
    ) -> (Self, mpsc::Receiver<TrilineEvent>) {
        let (intent_tx, intent_rx) = mpsc::unbounded_channel::<Intent>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<TrilineEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let session = GameSession::new(config.connection_id, config.target.clone());
        let state = Arc::new(SharedState::new(session.view().clone()));
        let loop_state = Arc::clone(&state);

        let task = tokio::spawn(reactor_loop(
            transport,
            intent_rx,
            event_tx,
            loop_state,
            shutdown_rx,
            session,
            stats,
        ));

        let client = Self {
            intent_tx,
            state,
            connection_id: config.connection_id,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        (client, event_rx)
    }

    // ── Intents ─────────────────────────────────────────────────────

    /// Place this player's symbol on `index`.
    ///
    /// The state machine drops the intent unless the game is in progress,
    /// the cell is empty, and it is this player's turn.
    ///
    /// # Errors
    ///
    /// Returns [`TrilineError::NotConnected`] if the reactor has exited.
    pub fn click_cell(&self, index: usize) -> Result<()> {
        self.send_intent(Intent::ClickCell(index))
    }

    /// Ask to replay the same matchup after a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`TrilineError::NotConnected`] if the reactor has exited.
    pub fn request_rematch(&self) -> Result<()> {
        self.send_intent(Intent::RequestRematch)
    }

    /// Leave a concluded session, closing the connection.
    ///
    /// # Errors
    ///
    /// Returns [`TrilineError::NotConnected`] if the reactor has exited.
    pub fn exit(&self) -> Result<()> {
        self.send_intent(Intent::Exit)
    }

    /// Shut down the client, closing the transport and stopping the reactor.
    ///
    /// The event receiver yields `Disconnected` and then `None` once the
    /// loop exits.
    pub async fn shutdown(&mut self) {
        debug!("TrilineClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Wait for the reactor with a timeout; abort if it does not exit in
        // time so the task cannot linger detached.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("reactor terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("reactor did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("reactor aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` while the transport is believed to be connected.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// This connection's identity.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Id of the live session, once created or joined.
    pub async fn session_id(&self) -> Option<SessionId> {
        self.state.session_id.lock().await.clone()
    }

    /// Snapshot of the derived session view.
    pub async fn view(&self) -> SessionView {
        self.state.view.lock().await.clone()
    }

    /// This connection's assigned symbol, if any.
    pub async fn player_symbol(&self) -> Option<PlayerSymbol> {
        self.state.view.lock().await.player_symbol
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn send_intent(&self, intent: Intent) -> Result<()> {
        if !self.state.connected.load(Ordering::Acquire) {
            return Err(TrilineError::NotConnected);
        }
        self.intent_tx
            .send(intent)
            .map_err(|_| TrilineError::NotConnected)
    }
}

impl std::fmt::Debug for TrilineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrilineClient")
            .field("connection_id", &self.connection_id)
            .field("connected", &self.is_connected())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for TrilineClient {
    fn drop(&mut self) {
        // `Drop` is synchronous, so a graceful close (which awaits
        // `transport.close()`) is not possible here. Aborting the task drops
        // the reactor future immediately; the shutdown oneshot is left
        // unsent on purpose.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Reactor loop ────────────────────────────────────────────────────

/// What `apply_effects` decided about the loop's future.
enum LoopOutcome {
    Continue,
    /// The view is done (exit intent or gameplay-critical error).
    Leave(Option<String>),
    /// The transport rejected a send.
    SendFailed(String),
}

/// Background reactor multiplexing intents, shutdown, and inbound events.
///
/// Exits when:
/// - the intent channel closes (handle dropped) or shutdown is signalled
/// - the state machine asks to leave the view
/// - the transport closes or errors
#[allow(clippy::too_many_arguments)]
async fn reactor_loop(
    mut transport: impl Transport,
    mut intent_rx: mpsc::UnboundedReceiver<Intent>,
    event_tx: mpsc::Sender<TrilineEvent>,
    state: Arc<SharedState>,
    mut shutdown_rx: oneshot::Receiver<()>,
    mut session: GameSession,
    stats: StatsReporter,
) {
    debug!("reactor loop started");

    // Synthetic Connected: the state machine decides what to emit first.
    let effects = session.handle_event(&TrilineEvent::Connected);
    sync_shared(&state, &session).await;
    emit_event(&event_tx, TrilineEvent::Connected).await;
    match apply_effects(effects, &mut transport, &stats).await {
        LoopOutcome::Continue => {}
        LoopOutcome::Leave(message) => {
            let _ = transport.close().await;
            finish(&event_tx, &state, &mut session, message).await;
            return;
        }
        LoopOutcome::SendFailed(reason) => {
            finish(&event_tx, &state, &mut session, Some(reason)).await;
            return;
        }
    }

    loop {
        tokio::select! {
            // Branch 1: user intent from the handle
            intent = intent_rx.recv() => {
                match intent {
                    Some(intent) => {
                        debug!(?intent, "processing user intent");
                        let effects = match intent {
                            Intent::ClickCell(index) => session.click_cell(index),
                            Intent::RequestRematch => session.request_rematch(),
                            Intent::Exit => session.exit(),
                        };
                        sync_shared(&state, &session).await;
                        match apply_effects(effects, &mut transport, &stats).await {
                            LoopOutcome::Continue => {}
                            LoopOutcome::Leave(message) => {
                                let _ = transport.close().await;
                                finish(&event_tx, &state, &mut session, message).await;
                                break;
                            }
                            LoopOutcome::SendFailed(reason) => {
                                finish(&event_tx, &state, &mut session, Some(reason)).await;
                                break;
                            }
                        }
                    }
                    // Intent channel closed — client handle dropped.
                    None => {
                        debug!("intent channel closed, shutting down reactor");
                        let _ = transport.close().await;
                        finish(&event_tx, &state, &mut session, Some("client shut down".into())).await;
                        break;
                    }
                }
            }

            // Branch 2: shutdown signal
            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                finish(&event_tx, &state, &mut session, Some("client shut down".into())).await;
                break;
            }

            // Branch 3: inbound message from the authority
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(msg) => {
                                let event = TrilineEvent::from(msg);
                                let effects = session.handle_event(&event);
                                sync_shared(&state, &session).await;
                                emit_event(&event_tx, event).await;
                                match apply_effects(effects, &mut transport, &stats).await {
                                    LoopOutcome::Continue => {}
                                    LoopOutcome::Leave(message) => {
                                        let _ = transport.close().await;
                                        finish(&event_tx, &state, &mut session, message).await;
                                        break;
                                    }
                                    LoopOutcome::SendFailed(reason) => {
                                        finish(&event_tx, &state, &mut session, Some(reason)).await;
                                        break;
                                    }
                                }
                            }
                            Err(e) => {
                                warn!("failed to deserialize authority message: {e} — raw: {text}");
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        finish(
                            &event_tx,
                            &state,
                            &mut session,
                            Some(format!("transport receive error: {e}")),
                        ).await;
                        break;
                    }
                    // Transport closed cleanly by the authority.
                    None => {
                        debug!("transport closed by authority");
                        finish(&event_tx, &state, &mut session, None).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("reactor loop exited");
}

/// Execute reducer effects against the transport and stats reporter.
async fn apply_effects(
    effects: Vec<Effect>,
    transport: &mut impl Transport,
    stats: &StatsReporter,
) -> LoopOutcome {
    let mut result = LoopOutcome::Continue;
    for effect in effects {
        match effect {
            Effect::Send(msg) => match serde_json::to_string(&msg) {
                Ok(json) => {
                    if let Err(e) = transport.send(json).await {
                        error!("transport send error: {e}");
                        return LoopOutcome::SendFailed(format!("transport send error: {e}"));
                    }
                }
                Err(e) => {
                    // A non-serializable message is a programming bug;
                    // the loop stays alive.
                    error!("failed to serialize client message: {e}");
                }
            },
            Effect::SessionAddress(session_id) => {
                debug!(%session_id, "session address updated");
            }
            Effect::ReportStats { outcome, symbol } => {
                stats.report(outcome, symbol);
            }
            Effect::LeaveView { message } => {
                result = LoopOutcome::Leave(message);
            }
        }
    }
    result
}

/// Mirror the machine's derived state into the shared handle state.
async fn sync_shared(state: &SharedState, session: &GameSession) {
    *state.session_id.lock().await = session.session_id().cloned();
    *state.view.lock().await = session.view().clone();
}

/// Emit an event to the consumer. A full channel drops the event with a
/// warning so the reactor is never blocked by a slow consumer.
async fn emit_event(event_tx: &mpsc::Sender<TrilineEvent>, event: TrilineEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Terminal path: run the synthetic `Disconnected` through the machine so
/// the view goes inert, then deliver the event. Uses a blocking `send`
/// because `Disconnected` is the final event and must never be dropped.
async fn finish(
    event_tx: &mpsc::Sender<TrilineEvent>,
    state: &SharedState,
    session: &mut GameSession,
    reason: Option<String>,
) {
    let event = TrilineEvent::Disconnected { reason };
    let _ = session.handle_event(&event);
    sync_shared(state, session).await;
    state.connected.store(false, Ordering::Release);
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
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
    use crate::protocol::{
        ClientMessage, GameMode, Outcome, PlayerSeat, SessionSnapshot, BOARD_CELLS,
    };
    use crate::session::SessionPhase;
    use crate::stats::{StatsSink, StatsTally};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    // ── Mock transport ──────────────────────────────────────────────

    /// Records sent messages and replays scripted authority responses.
    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<String, TrilineError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<std::result::Result<String, TrilineError>>>,
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
        async fn send(&mut self, message: String) -> std::result::Result<(), TrilineError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, TrilineError>> {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                // Scripted input exhausted — stay alive until shutdown.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), TrilineError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn conn(n: u128) -> ConnectionId {
        ConnectionId::from_u128(n)
    }

    fn snapshot(seats: &[(ConnectionId, PlayerSymbol)], turn: PlayerSymbol) -> SessionSnapshot {
        SessionSnapshot {
            board: vec![None; BOARD_CELLS],
            players: seats
                .iter()
                .map(|&(id, symbol)| PlayerSeat { id, symbol })
                .collect(),
            current_player: turn,
            game_mode: GameMode::Online,
            winner: None,
            difficulty: None,
        }
    }

    fn created_json(session_id: &str, snap: &SessionSnapshot) -> String {
        serde_json::to_string(&ServerMessage::GameCreated {
            game_id: session_id.into(),
            game_state: snap.clone(),
        })
        .unwrap()
    }

    fn update_json(snap: &SessionSnapshot) -> String {
        serde_json::to_string(&ServerMessage::GameUpdate(snap.clone())).unwrap()
    }

    fn over_json(snap: &SessionSnapshot, outcome: Outcome) -> String {
        let mut snap = snap.clone();
        snap.winner = Some(outcome);
        serde_json::to_string(&ServerMessage::GameOver(snap)).unwrap()
    }

    fn sent_messages(sent: &Arc<StdMutex<Vec<String>>>) -> Vec<ClientMessage> {
        sent.lock()
            .unwrap()
            .iter()
            .map(|json| serde_json::from_str(json).unwrap())
            .collect()
    }

    fn online_config(id: ConnectionId) -> TrilineConfig {
        TrilineConfig::create(GameConfig::new(GameMode::Online, PlayerSymbol::X))
            .with_connection_id(id)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    struct CountingSink(Arc<StdMutex<Vec<StatsTally>>>);

    #[async_trait]
    impl StatsSink for CountingSink {
        async fn submit(&self, tally: StatsTally) -> crate::error::Result<()> {
            self.0.lock().unwrap().push(tally);
            Ok(())
        }
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_target_sends_create_game_first() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = TrilineClient::start(transport, online_config(conn(1)));

        let first = events.recv().await.unwrap();
        assert!(matches!(first, TrilineEvent::Connected));
        settle().await;

        let messages = sent_messages(&sent);
        assert!(matches!(
            messages.first(),
            Some(ClientMessage::CreateGame {
                game_mode: GameMode::Online,
                symbol: PlayerSymbol::X,
                ..
            })
        ));
        if let Some(ClientMessage::CreateGame { connection_id, .. }) = messages.first() {
            assert_eq!(*connection_id, conn(1));
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn join_target_sends_join_game_first() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let config = TrilineConfig::join("abc123").with_connection_id(conn(2));
        let (mut client, mut events) = TrilineClient::start(transport, config);

        let _ = events.recv().await; // Connected
        settle().await;

        let messages = sent_messages(&sent);
        assert_eq!(
            messages.first(),
            Some(&ClientMessage::JoinGame {
                game_id: "abc123".into(),
            })
        );
        assert_eq!(client.session_id().await.as_deref(), Some("abc123"));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn created_online_session_waits_for_opponent() {
        let snap = snapshot(&[(conn(1), PlayerSymbol::X)], PlayerSymbol::X);
        let (transport, _sent, _closed) =
            MockTransport::new(vec![Some(Ok(created_json("abc123", &snap)))]);
        let (mut client, mut events) = TrilineClient::start(transport, online_config(conn(1)));

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        assert!(matches!(event, TrilineEvent::GameCreated { .. }));

        let view = client.view().await;
        assert_eq!(view.phase, SessionPhase::WaitingForOpponent);
        assert!(view.message.unwrap().to_lowercase().contains("waiting"));
        assert_eq!(client.session_id().await.as_deref(), Some("abc123"));
        assert_eq!(client.player_symbol().await, Some(PlayerSymbol::X));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn joiner_derives_opposite_symbol_and_game_starts() {
        let snap = snapshot(
            &[(conn(1), PlayerSymbol::X), (conn(2), PlayerSymbol::O)],
            PlayerSymbol::X,
        );
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(update_json(&snap)))]);
        let config = TrilineConfig::join("abc123").with_connection_id(conn(2));
        let (mut client, mut events) = TrilineClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // GameUpdate

        let view = client.view().await;
        assert_eq!(view.phase, SessionPhase::InProgress);
        assert_eq!(view.player_symbol, Some(PlayerSymbol::O));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn click_in_turn_reaches_the_wire() {
        let snap = snapshot(
            &[(conn(1), PlayerSymbol::X), (conn(2), PlayerSymbol::O)],
            PlayerSymbol::X,
        );
        let (transport, sent, _closed) =
            MockTransport::new(vec![Some(Ok(created_json("abc123", &snap)))]);
        let (mut client, mut events) = TrilineClient::start(transport, online_config(conn(1)));

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // GameCreated
        client.click_cell(4).unwrap();
        settle().await;

        let messages = sent_messages(&sent);
        assert_eq!(
            messages.last(),
            Some(&ClientMessage::MakeMove {
                game_id: "abc123".into(),
                index: 4,
                player_symbol: PlayerSymbol::X,
            })
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn click_out_of_turn_never_reaches_the_wire() {
        let snap = snapshot(
            &[(conn(1), PlayerSymbol::X), (conn(2), PlayerSymbol::O)],
            PlayerSymbol::O,
        );
        let (transport, sent, _closed) =
            MockTransport::new(vec![Some(Ok(created_json("abc123", &snap)))]);
        let (mut client, mut events) = TrilineClient::start(transport, online_config(conn(1)));

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // GameCreated
        client.click_cell(4).unwrap();
        settle().await;

        let messages = sent_messages(&sent);
        assert!(
            !messages
                .iter()
                .any(|m| matches!(m, ClientMessage::MakeMove { .. })),
            "out-of-turn move must be dropped client-side"
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn game_over_reports_stats_exactly_once() {
        let snap = snapshot(
            &[(conn(1), PlayerSymbol::X), (conn(2), PlayerSymbol::O)],
            PlayerSymbol::X,
        );
        // Authority sends the terminal snapshot twice (duplicate delivery).
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(created_json("abc123", &snap))),
            Some(Ok(over_json(&snap, Outcome::Winner(PlayerSymbol::X)))),
            Some(Ok(over_json(&snap, Outcome::Winner(PlayerSymbol::X)))),
        ]);

        let tallies = Arc::new(StdMutex::new(Vec::new()));
        let reporter = StatsReporter::new(Arc::new(CountingSink(Arc::clone(&tallies))));
        let (mut client, mut events) =
            TrilineClient::start_with_stats(transport, online_config(conn(1)), reporter);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // GameCreated
        let _ = events.recv().await; // GameOver
        let _ = events.recv().await; // GameOver (duplicate)
        settle().await;

        let recorded = tallies.lock().unwrap().clone();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].wins, 1);

        let view = client.view().await;
        assert_eq!(view.phase, SessionPhase::Over);
        assert_eq!(view.message.as_deref(), Some("Player X wins!"));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn draw_reports_a_draw_tally() {
        let snap = snapshot(
            &[(conn(1), PlayerSymbol::X), (conn(2), PlayerSymbol::O)],
            PlayerSymbol::X,
        );
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(created_json("abc123", &snap))),
            Some(Ok(over_json(&snap, Outcome::Draw))),
        ]);

        let tallies = Arc::new(StdMutex::new(Vec::new()));
        let reporter = StatsReporter::new(Arc::new(CountingSink(Arc::clone(&tallies))));
        let (mut client, mut events) =
            TrilineClient::start_with_stats(transport, online_config(conn(1)), reporter);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // GameCreated
        let _ = events.recv().await; // GameOver
        settle().await;

        let recorded = tallies.lock().unwrap().clone();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].draws, 1);
        assert_eq!(
            client.view().await.message.as_deref(),
            Some("It's a draw!")
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn player_left_makes_the_board_inert() {
        let snap = snapshot(
            &[(conn(1), PlayerSymbol::X), (conn(2), PlayerSymbol::O)],
            PlayerSymbol::X,
        );
        let left = serde_json::to_string(&ServerMessage::PlayerLeft {
            message: "Opponent left the game".into(),
        })
        .unwrap();
        let (transport, sent, _closed) = MockTransport::new(vec![
            Some(Ok(created_json("abc123", &snap))),
            Some(Ok(left)),
        ]);
        let (mut client, mut events) = TrilineClient::start(transport, online_config(conn(1)));

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // GameCreated
        let event = events.recv().await.unwrap();
        assert!(matches!(event, TrilineEvent::PlayerLeft { .. }));

        let view = client.view().await;
        assert!(view.is_over());
        assert_eq!(view.message.as_deref(), Some("Opponent left the game"));

        // Clicks after the departure go nowhere.
        client.click_cell(0).unwrap();
        settle().await;
        let messages = sent_messages(&sent);
        assert!(!messages
            .iter()
            .any(|m| matches!(m, ClientMessage::MakeMove { .. })));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn server_error_tears_the_view_down() {
        let error = serde_json::to_string(&ServerMessage::Error {
            message: "Game not found".into(),
        })
        .unwrap();
        let (transport, _sent, closed) = MockTransport::new(vec![Some(Ok(error))]);
        let config = TrilineConfig::join("missing").with_connection_id(conn(5));
        let (mut client, mut events) = TrilineClient::start(transport, config);

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        assert!(matches!(event, TrilineEvent::ServerError { .. }));

        let event = events.recv().await.unwrap();
        if let TrilineEvent::Disconnected { reason } = event {
            assert_eq!(reason.as_deref(), Some("Game not found"));
        } else {
            panic!("expected Disconnected, got {event:?}");
        }

        assert!(closed.load(Ordering::Relaxed));
        assert!(!client.is_connected());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn rematch_intent_is_sent_once() {
        let snap = snapshot(
            &[(conn(1), PlayerSymbol::X), (conn(2), PlayerSymbol::O)],
            PlayerSymbol::X,
        );
        let (transport, sent, _closed) = MockTransport::new(vec![
            Some(Ok(created_json("abc123", &snap))),
            Some(Ok(over_json(&snap, Outcome::Winner(PlayerSymbol::O)))),
        ]);
        let (mut client, mut events) = TrilineClient::start(transport, online_config(conn(1)));

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // GameCreated
        let _ = events.recv().await; // GameOver

        client.request_rematch().unwrap();
        client.request_rematch().unwrap();
        settle().await;

        let rematches = sent_messages(&sent)
            .iter()
            .filter(|m| matches!(m, ClientMessage::RequestRematch { .. }))
            .count();
        assert_eq!(rematches, 1);
        assert!(client.view().await.rematch_offered);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn exit_intent_closes_the_connection() {
        let snap = snapshot(
            &[(conn(1), PlayerSymbol::X), (conn(2), PlayerSymbol::O)],
            PlayerSymbol::X,
        );
        let (transport, _sent, closed) = MockTransport::new(vec![
            Some(Ok(created_json("abc123", &snap))),
            Some(Ok(over_json(&snap, Outcome::Draw))),
        ]);
        let (mut client, mut events) = TrilineClient::start(transport, online_config(conn(1)));

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // GameCreated
        let _ = events.recv().await; // GameOver

        client.exit().unwrap();
        let event = events.recv().await.unwrap();
        assert!(matches!(event, TrilineEvent::Disconnected { .. }));
        assert!(closed.load(Ordering::Relaxed));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn transport_close_emits_disconnected() {
        let (transport, _sent, _closed) = MockTransport::new(vec![None]);
        let (mut client, mut events) = TrilineClient::start(transport, online_config(conn(1)));

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        assert!(matches!(event, TrilineEvent::Disconnected { reason: None }));
        assert!(!client.is_connected());
        // The view went inert rather than hanging silently.
        assert!(client.view().await.is_over());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn transport_error_carries_the_reason() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Err(
            TrilineError::TransportReceive("boom".into()),
        ))]);
        let (mut client, mut events) = TrilineClient::start(transport, online_config(conn(1)));

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        if let TrilineEvent::Disconnected { reason } = event {
            assert!(reason.unwrap().contains("boom"));
        } else {
            panic!("expected Disconnected, got {event:?}");
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn intents_fail_after_shutdown() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = TrilineClient::start(transport, online_config(conn(1)));

        let _ = events.recv().await; // Connected
        client.shutdown().await;

        let err = client.click_cell(0).unwrap_err();
        assert!(matches!(err, TrilineError::NotConnected));
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = TrilineClient::start(transport, online_config(conn(1)));

        let _ = events.recv().await; // Connected
        client.shutdown().await;
        client.shutdown().await;
    }

    #[tokio::test]
    async fn drop_without_shutdown_does_not_hang() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (client, mut events) = TrilineClient::start(transport, online_config(conn(1)));

        let _ = events.recv().await; // Connected
        drop(client);

        // Drain whatever is left; the channel must close rather than hang.
        while events.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn config_defaults() {
        let config = TrilineConfig::join("abc123");
        assert_eq!(config.event_channel_capacity, 128);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.target, SessionTarget::Join("abc123".into()));
    }

    #[tokio::test]
    async fn event_channel_capacity_is_clamped() {
        let config = TrilineConfig::join("abc123").with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }
}
