#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for the Triline client.
//!
//! Drives `TrilineClient` end-to-end over mock transports from
//! `tests/common`, covering the full session lifecycle: create/join
//! handshake, authoritative move round-trips, game over with stats
//! reporting, rematch negotiation, opponent departure, and error teardown.

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{
    conn, error_json, game_created_json, game_over_json, game_update_json, player_left_json,
    rematch_offer_json, snapshot, two_player_snapshot, ChannelTransport, MockTransport,
};
use triline_client::protocol::{ClientMessage, GameMode, Outcome, PlayerSymbol};
use triline_client::session::{GameConfig, SessionPhase};
use triline_client::stats::{StatsSink, StatsTally};
use triline_client::{StatsReporter, TrilineClient, TrilineConfig, TrilineEvent};

// ── Helpers ─────────────────────────────────────────────────────────

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

fn creator_config(id: u128) -> TrilineConfig {
    TrilineConfig::create(GameConfig::new(GameMode::Online, PlayerSymbol::X))
        .with_connection_id(conn(id))
}

fn sent_messages(sent: &Arc<StdMutex<Vec<String>>>) -> Vec<ClientMessage> {
    sent.lock()
        .unwrap()
        .iter()
        .map(|json| serde_json::from_str(json).unwrap())
        .collect()
}

struct CountingSink(Arc<StdMutex<Vec<StatsTally>>>);

impl CountingSink {
    fn reporter() -> (StatsReporter, Arc<StdMutex<Vec<StatsTally>>>) {
        let tallies = Arc::new(StdMutex::new(Vec::new()));
        let reporter = StatsReporter::new(Arc::new(CountingSink(Arc::clone(&tallies))));
        (reporter, tallies)
    }
}

#[async_trait]
impl StatsSink for CountingSink {
    async fn submit(&self, tally: StatsTally) -> Result<(), triline_client::TrilineError> {
        self.0.lock().unwrap().push(tally);
        Ok(())
    }
}

// ── Session establishment ───────────────────────────────────────────

#[tokio::test]
async fn creating_an_online_game_waits_for_an_opponent() {
    let snap = snapshot(
        &[(conn(1), PlayerSymbol::X)],
        GameMode::Online,
        PlayerSymbol::X,
    );
    let (transport, sent, _closed) =
        MockTransport::new(vec![Some(Ok(game_created_json("abc123", &snap)))]);
    let (mut client, mut events) = TrilineClient::start(transport, creator_config(1));

    assert!(matches!(
        events.recv().await.unwrap(),
        TrilineEvent::Connected
    ));
    let event = events.recv().await.unwrap();
    let TrilineEvent::GameCreated { session_id, .. } = event else {
        panic!("expected GameCreated, got {event:?}");
    };
    assert_eq!(session_id, "abc123");

    let view = client.view().await;
    assert_eq!(view.phase, SessionPhase::WaitingForOpponent);
    assert!(view.message.unwrap().to_lowercase().contains("waiting"));
    assert_eq!(view.player_symbol, Some(PlayerSymbol::X));
    assert_eq!(client.session_id().await.as_deref(), Some("abc123"));

    // The handshake emitted exactly one createGame.
    let messages = sent_messages(&sent);
    assert_eq!(messages.len(), 1);
    assert!(matches!(messages[0], ClientMessage::CreateGame { .. }));

    client.shutdown().await;
}

#[tokio::test]
async fn both_participants_reach_in_progress_with_opposite_symbols() {
    let full = two_player_snapshot(conn(1), conn(2));

    // Creator: sees the solo snapshot, then the full one.
    let solo = snapshot(
        &[(conn(1), PlayerSymbol::X)],
        GameMode::Online,
        PlayerSymbol::X,
    );
    let (creator_transport, _s1, _c1) = MockTransport::new(vec![
        Some(Ok(game_created_json("abc123", &solo))),
        Some(Ok(game_update_json(&full))),
    ]);
    let (mut creator, mut creator_events) =
        TrilineClient::start(creator_transport, creator_config(1));

    // Joiner: joins by id and receives the full snapshot.
    let (joiner_transport, j_sent, _c2) =
        MockTransport::new(vec![Some(Ok(game_update_json(&full)))]);
    let joiner_config = TrilineConfig::join("abc123").with_connection_id(conn(2));
    let (mut joiner, mut joiner_events) = TrilineClient::start(joiner_transport, joiner_config);

    for _ in 0..3 {
        let _ = creator_events.recv().await; // Connected, GameCreated, GameUpdate
    }
    for _ in 0..2 {
        let _ = joiner_events.recv().await; // Connected, GameUpdate
    }

    assert_eq!(creator.view().await.phase, SessionPhase::InProgress);
    assert_eq!(joiner.view().await.phase, SessionPhase::InProgress);
    assert_eq!(creator.player_symbol().await, Some(PlayerSymbol::X));
    assert_eq!(joiner.player_symbol().await, Some(PlayerSymbol::O));

    let joiner_messages = sent_messages(&j_sent);
    assert_eq!(
        joiner_messages.first(),
        Some(&ClientMessage::JoinGame {
            game_id: "abc123".into(),
        })
    );

    creator.shutdown().await;
    joiner.shutdown().await;
}

// ── Moves ───────────────────────────────────────────────────────────

#[tokio::test]
async fn a_move_round_trips_through_the_authority() {
    let (transport, authority, sent, _closed) = ChannelTransport::new();
    let (mut client, mut events) = TrilineClient::start(transport, creator_config(1));
    let _ = events.recv().await; // Connected

    let start = two_player_snapshot(conn(1), conn(2));
    authority
        .send(Ok(game_created_json("abc123", &start)))
        .unwrap();
    let _ = events.recv().await; // GameCreated

    // X clicks cell 4 on its turn.
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

    // The authority accepts and broadcasts the mutated snapshot.
    let mut after = start.clone();
    after.board[4] = Some(PlayerSymbol::X);
    after.current_player = PlayerSymbol::O;
    authority.send(Ok(game_update_json(&after))).unwrap();
    let _ = events.recv().await; // GameUpdate

    let view = client.view().await;
    let snap = view.snapshot.unwrap();
    assert_eq!(snap.board[4], Some(PlayerSymbol::X));
    assert_eq!(snap.current_player, PlayerSymbol::O);

    // It is no longer X's turn, so a second click is dropped locally.
    client.click_cell(0).unwrap();
    settle().await;
    let move_count = sent_messages(&sent)
        .iter()
        .filter(|m| matches!(m, ClientMessage::MakeMove { .. }))
        .count();
    assert_eq!(move_count, 1);

    client.shutdown().await;
}

#[tokio::test]
async fn clicks_before_a_session_exists_send_nothing() {
    let (transport, sent, _closed) = MockTransport::new(vec![]);
    let (mut client, mut events) = TrilineClient::start(transport, creator_config(1));
    let _ = events.recv().await; // Connected

    client.click_cell(0).unwrap();
    settle().await;

    let messages = sent_messages(&sent);
    assert!(!messages
        .iter()
        .any(|m| matches!(m, ClientMessage::MakeMove { .. })));

    client.shutdown().await;
}

// ── Game over and stats ─────────────────────────────────────────────

#[tokio::test]
async fn a_win_sets_the_outcome_message_and_reports_once() {
    let snap = two_player_snapshot(conn(1), conn(2));
    let (transport, _sent, _closed) = MockTransport::new(vec![
        Some(Ok(game_created_json("abc123", &snap))),
        Some(Ok(game_over_json(&snap, Outcome::Winner(PlayerSymbol::X)))),
    ]);
    let (reporter, tallies) = CountingSink::reporter();
    let (mut client, mut events) =
        TrilineClient::start_with_stats(transport, creator_config(1), reporter);

    let _ = events.recv().await; // Connected
    let _ = events.recv().await; // GameCreated
    let event = events.recv().await.unwrap();
    assert!(matches!(event, TrilineEvent::GameOver { .. }));
    settle().await;

    let view = client.view().await;
    assert_eq!(view.phase, SessionPhase::Over);
    assert_eq!(view.message.as_deref(), Some("Player X wins!"));

    let recorded = tallies.lock().unwrap().clone();
    assert_eq!(recorded.len(), 1);
    assert_eq!(
        recorded[0],
        StatsTally {
            wins: 1,
            losses: 0,
            draws: 0
        }
    );

    client.shutdown().await;
}

#[tokio::test]
async fn a_draw_increments_draws_for_both_participants() {
    let snap = two_player_snapshot(conn(1), conn(2));

    let mut handles = Vec::new();
    for id in [1u128, 2] {
        let script = vec![
            Some(Ok(game_update_json(&snap))),
            Some(Ok(game_over_json(&snap, Outcome::Draw))),
        ];
        let (transport, _sent, _closed) = MockTransport::new(script);
        let config = TrilineConfig::join("abc123").with_connection_id(conn(id));
        let (reporter, tallies) = CountingSink::reporter();
        let (client, events) = TrilineClient::start_with_stats(transport, config, reporter);
        handles.push((client, events, tallies));
    }

    for (client, events, tallies) in &mut handles {
        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // GameUpdate
        let _ = events.recv().await; // GameOver
        settle().await;

        assert_eq!(client.view().await.message.as_deref(), Some("It's a draw!"));
        let recorded = tallies.lock().unwrap().clone();
        assert_eq!(recorded.len(), 1, "each participant reports independently");
        assert_eq!(recorded[0].draws, 1);
    }

    for (client, _, _) in &mut handles {
        client.shutdown().await;
    }
}

#[tokio::test]
async fn an_unassigned_viewer_never_reports_stats() {
    // conn(9) holds no seat in the session it observes.
    let snap = two_player_snapshot(conn(1), conn(2));
    let (transport, _sent, _closed) = MockTransport::new(vec![
        Some(Ok(game_update_json(&snap))),
        Some(Ok(game_over_json(&snap, Outcome::Winner(PlayerSymbol::O)))),
    ]);
    let config = TrilineConfig::join("abc123").with_connection_id(conn(9));
    let (reporter, tallies) = CountingSink::reporter();
    let (mut client, mut events) = TrilineClient::start_with_stats(transport, config, reporter);

    let _ = events.recv().await; // Connected
    let _ = events.recv().await; // GameUpdate
    let _ = events.recv().await; // GameOver
    settle().await;

    assert!(tallies.lock().unwrap().is_empty());
    assert!(client.player_symbol().await.is_none());

    client.shutdown().await;
}

// ── Rematch negotiation ─────────────────────────────────────────────

#[tokio::test]
async fn rematch_handshake_restarts_the_session() {
    let (transport, authority, sent, _closed) = ChannelTransport::new();
    let (mut client, mut events) = TrilineClient::start(transport, creator_config(1));
    let _ = events.recv().await; // Connected

    let snap = two_player_snapshot(conn(1), conn(2));
    authority
        .send(Ok(game_created_json("abc123", &snap)))
        .unwrap();
    let _ = events.recv().await; // GameCreated

    authority
        .send(Ok(game_over_json(&snap, Outcome::Winner(PlayerSymbol::O))))
        .unwrap();
    let _ = events.recv().await; // GameOver

    // Our side asks for a rematch; the authority echoes the offer back.
    client.request_rematch().unwrap();
    settle().await;
    assert!(sent_messages(&sent)
        .iter()
        .any(|m| matches!(m, ClientMessage::RequestRematch { .. })));
    assert!(client.view().await.rematch_offered);

    authority.send(Ok(rematch_offer_json(conn(1)))).unwrap();
    let _ = events.recv().await; // RematchOffer (self — ignored)
    assert!(!client.view().await.opponent_requested_rematch);

    // The opponent agrees.
    authority.send(Ok(rematch_offer_json(conn(2)))).unwrap();
    let _ = events.recv().await; // RematchOffer (opponent)
    assert!(client.view().await.opponent_requested_rematch);

    // Both agreed: a fresh session snapshot replaces the concluded one.
    let fresh = two_player_snapshot(conn(1), conn(2));
    authority.send(Ok(game_update_json(&fresh))).unwrap();
    let _ = events.recv().await; // GameUpdate

    let view = client.view().await;
    assert_eq!(view.phase, SessionPhase::InProgress);
    assert!(!view.rematch_offered);
    assert!(!view.opponent_requested_rematch);
    assert!(view.message.is_none());

    client.shutdown().await;
}

// ── Departures and failures ─────────────────────────────────────────

#[tokio::test]
async fn opponent_departure_shows_the_exit_path() {
    let snap = two_player_snapshot(conn(1), conn(2));
    let (transport, sent, closed) = MockTransport::new(vec![
        Some(Ok(game_created_json("abc123", &snap))),
        Some(Ok(player_left_json("Opponent left the game"))),
    ]);
    let (mut client, mut events) = TrilineClient::start(transport, creator_config(1));

    let _ = events.recv().await; // Connected
    let _ = events.recv().await; // GameCreated
    let event = events.recv().await.unwrap();
    let TrilineEvent::PlayerLeft { message } = event else {
        panic!("expected PlayerLeft, got {event:?}");
    };
    assert_eq!(message, "Opponent left the game");

    // The board is inert but the connection stays up for the exit choice.
    let view = client.view().await;
    assert!(view.is_over());
    client.click_cell(0).unwrap();
    settle().await;
    assert!(!sent_messages(&sent)
        .iter()
        .any(|m| matches!(m, ClientMessage::MakeMove { .. })));

    // Exiting tears the connection down.
    client.exit().unwrap();
    let event = events.recv().await.unwrap();
    assert!(matches!(event, TrilineEvent::Disconnected { .. }));
    assert!(closed.load(Ordering::Relaxed));

    client.shutdown().await;
}

#[tokio::test]
async fn a_rejected_join_surfaces_the_error_and_disconnects() {
    let (transport, _sent, closed) =
        MockTransport::new(vec![Some(Ok(error_json("Game not found")))]);
    let config = TrilineConfig::join("nope").with_connection_id(conn(3));
    let (mut client, mut events) = TrilineClient::start(transport, config);

    let _ = events.recv().await; // Connected
    let event = events.recv().await.unwrap();
    let TrilineEvent::ServerError { message } = event else {
        panic!("expected ServerError, got {event:?}");
    };
    assert_eq!(message, "Game not found");

    let event = events.recv().await.unwrap();
    let TrilineEvent::Disconnected { reason } = event else {
        panic!("expected Disconnected, got {event:?}");
    };
    assert_eq!(reason.as_deref(), Some("Game not found"));
    assert!(closed.load(Ordering::Relaxed));
    assert!(!client.is_connected());

    client.shutdown().await;
}

#[tokio::test]
async fn a_dropped_connection_never_hangs_silently() {
    let snap = two_player_snapshot(conn(1), conn(2));
    let (transport, authority, _sent, _closed) = ChannelTransport::new();
    let (mut client, mut events) = TrilineClient::start(transport, creator_config(1));

    let _ = events.recv().await; // Connected
    authority
        .send(Ok(game_created_json("abc123", &snap)))
        .unwrap();
    let _ = events.recv().await; // GameCreated

    // Authority goes away mid-game.
    drop(authority);
    let event = events.recv().await.unwrap();
    assert!(matches!(event, TrilineEvent::Disconnected { .. }));

    let view = client.view().await;
    assert!(view.is_over());
    assert!(view.message.is_some(), "the dead end must be visible");

    client.shutdown().await;
}

// ── Ordering and idempotence ────────────────────────────────────────

#[tokio::test]
async fn events_are_delivered_in_emission_order() {
    let base = two_player_snapshot(conn(1), conn(2));
    let mut first = base.clone();
    first.board[0] = Some(PlayerSymbol::X);
    first.current_player = PlayerSymbol::O;
    let mut second = first.clone();
    second.board[1] = Some(PlayerSymbol::O);
    second.current_player = PlayerSymbol::X;

    let (transport, _sent, _closed) = MockTransport::new(vec![
        Some(Ok(game_created_json("abc123", &base))),
        Some(Ok(game_update_json(&first))),
        Some(Ok(game_update_json(&second))),
    ]);
    let (mut client, mut events) = TrilineClient::start(transport, creator_config(1));

    let _ = events.recv().await; // Connected
    let _ = events.recv().await; // GameCreated

    let mut occupied = Vec::new();
    for _ in 0..2 {
        let event = events.recv().await.unwrap();
        let TrilineEvent::GameUpdate { snapshot } = event else {
            panic!("expected GameUpdate");
        };
        occupied.push(snapshot.board.iter().flatten().count());
    }
    assert_eq!(occupied, vec![1, 2], "no reordering or coalescing");

    client.shutdown().await;
}

#[tokio::test]
async fn a_duplicate_snapshot_leaves_the_view_unchanged() {
    let snap = two_player_snapshot(conn(1), conn(2));
    let (transport, authority, _sent, _closed) = ChannelTransport::new();
    let (mut client, mut events) = TrilineClient::start(transport, creator_config(1));
    let _ = events.recv().await; // Connected

    authority.send(Ok(game_update_json(&snap))).unwrap();
    let _ = events.recv().await; // GameUpdate
    let first = client.view().await;

    authority.send(Ok(game_update_json(&snap))).unwrap();
    let _ = events.recv().await; // GameUpdate (duplicate)
    let second = client.view().await;

    assert_eq!(first, second);

    client.shutdown().await;
}
