//! Fire-and-forget stats reporting for concluded games.
//!
//! The session state machine emits a single
//! [`Effect::ReportStats`](crate::session::Effect::ReportStats) per terminal
//! transition; [`StatsReporter`] turns it into one side-channel submission.
//! Submission failure is logged and swallowed — a missed tally is an
//! acceptable degradation, never a gameplay fault.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::protocol::{Outcome, PlayerSymbol};

// ── Tally ───────────────────────────────────────────────────────────

/// A single-game increment for the persistence service: exactly one of the
/// three counters is 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StatsTally {
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

impl StatsTally {
    /// Compute the increment for a concluded game from this player's
    /// perspective.
    pub fn for_outcome(outcome: Outcome, symbol: PlayerSymbol) -> Self {
        match outcome {
            Outcome::Draw => Self {
                draws: 1,
                ..Self::default()
            },
            Outcome::Winner(winner) if winner == symbol => Self {
                wins: 1,
                ..Self::default()
            },
            Outcome::Winner(_) => Self {
                losses: 1,
                ..Self::default()
            },
        }
    }
}

// ── Sink ────────────────────────────────────────────────────────────

/// Destination for stats submissions.
///
/// The default implementation is [`ApiClient`](crate::api::ApiClient)
/// (feature `stats-http`); tests supply channel- or counter-backed sinks.
#[async_trait]
pub trait StatsSink: Send + Sync + 'static {
    /// Submit one tally. Called at most once per concluded game.
    async fn submit(&self, tally: StatsTally) -> Result<()>;
}

// ── Reporter ────────────────────────────────────────────────────────

/// Hands concluded-game tallies to a [`StatsSink`] without ever blocking or
/// failing the game loop.
pub struct StatsReporter {
    sink: Option<Arc<dyn StatsSink>>,
}

impl StatsReporter {
    /// A reporter that submits through the given sink.
    pub fn new(sink: Arc<dyn StatsSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// A reporter that drops every report. Used when no credential is held.
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Returns `true` if reports will actually be submitted.
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Report a concluded game. No-op when disabled or when `symbol` is
    /// absent (an unassigned viewer has no tally to record). The submission
    /// runs on a detached task; errors are logged at `warn` and never
    /// surfaced or retried.
    pub fn report(&self, outcome: Outcome, symbol: Option<PlayerSymbol>) {
        let Some(sink) = &self.sink else {
            debug!("stats reporting disabled, dropping report");
            return;
        };
        let Some(symbol) = symbol else {
            debug!("no assigned symbol, dropping stats report");
            return;
        };
        let tally = StatsTally::for_outcome(outcome, symbol);
        let sink = Arc::clone(sink);
        tokio::spawn(async move {
            if let Err(e) = sink.submit(tally).await {
                warn!("stats submission failed: {e}");
            }
        });
    }
}

impl std::fmt::Debug for StatsReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsReporter")
            .field("enabled", &self.is_enabled())
            .finish()
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
    use crate::error::TrilineError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::mpsc;

    struct ChannelSink(mpsc::UnboundedSender<StatsTally>);

    #[async_trait]
    impl StatsSink for ChannelSink {
        async fn submit(&self, tally: StatsTally) -> Result<()> {
            let _ = self.0.send(tally);
            Ok(())
        }
    }

    struct FailingSink(Arc<AtomicU32>);

    #[async_trait]
    impl StatsSink for FailingSink {
        async fn submit(&self, _tally: StatsTally) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(TrilineError::Unauthenticated)
        }
    }

    #[test]
    fn tally_for_win() {
        let tally = StatsTally::for_outcome(Outcome::Winner(PlayerSymbol::X), PlayerSymbol::X);
        assert_eq!(
            tally,
            StatsTally {
                wins: 1,
                losses: 0,
                draws: 0
            }
        );
    }

    #[test]
    fn tally_for_loss() {
        let tally = StatsTally::for_outcome(Outcome::Winner(PlayerSymbol::O), PlayerSymbol::X);
        assert_eq!(
            tally,
            StatsTally {
                wins: 0,
                losses: 1,
                draws: 0
            }
        );
    }

    #[test]
    fn tally_for_draw_is_symbol_independent() {
        for symbol in [PlayerSymbol::X, PlayerSymbol::O] {
            let tally = StatsTally::for_outcome(Outcome::Draw, symbol);
            assert_eq!(
                tally,
                StatsTally {
                    wins: 0,
                    losses: 0,
                    draws: 1
                }
            );
        }
    }

    #[tokio::test]
    async fn report_submits_through_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = StatsReporter::new(Arc::new(ChannelSink(tx)));
        reporter.report(Outcome::Winner(PlayerSymbol::O), Some(PlayerSymbol::O));
        let tally = rx.recv().await.unwrap();
        assert_eq!(tally.wins, 1);
    }

    #[tokio::test]
    async fn report_without_symbol_is_dropped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = StatsReporter::new(Arc::new(ChannelSink(tx)));
        reporter.report(Outcome::Draw, None);
        // The channel closes without ever receiving a tally.
        drop(reporter);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn disabled_reporter_is_a_no_op() {
        let reporter = StatsReporter::disabled();
        assert!(!reporter.is_enabled());
        // Must not panic or spawn anything that outlives the call.
        reporter.report(Outcome::Draw, Some(PlayerSymbol::X));
    }

    #[tokio::test]
    async fn sink_failure_is_swallowed() {
        let attempts = Arc::new(AtomicU32::new(0));
        let reporter = StatsReporter::new(Arc::new(FailingSink(Arc::clone(&attempts))));
        reporter.report(Outcome::Winner(PlayerSymbol::X), Some(PlayerSymbol::O));
        // Give the detached task a moment to run and fail.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
