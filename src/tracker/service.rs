//! Tracker actor and its handle.
//!
//! All state lives in one spawned task. Every entrypoint is a
//! `TrackerCommand` sent over an unbounded channel, and timer expiries
//! arrive on a second channel, so handlers never run concurrently and a
//! tab's reset and increment are applied atomically with respect to other
//! events.
//!
//! # Event Loop
//!
//! ```text
//! Tracker (handle) ──TrackerCommand──┐
//!                                    ▼
//!                             ┌─────────────┐      ┌──────────────┐
//!                             │ actor task  │◄─────│ timer tasks  │
//!                             │ TrackerState│ flush│ (1 per tab)  │
//!                             └──────┬──────┘      └──────────────┘
//!                                    │ SnapshotUpdate
//!                                    ▼
//!                              observer sinks
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::ops::ControlFlow;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::config::TrackerConfig;
use crate::error::{Error, Result};
use crate::identifiers::{ChannelId, TabId};
use crate::protocol::RequestObserved;

use super::registry::SnapshotSink;
use super::scheduler::PendingFlush;
use super::state::{TrackerState, TrackerStats};
use super::store::DomainSnapshot;

// ============================================================================
// TrackerCommand
// ============================================================================

/// Commands processed by the actor, in arrival order.
enum TrackerCommand {
    /// Ingest one request.
    Observe(RequestObserved),
    /// Bind a channel to a tab.
    Subscribe {
        channel_id: ChannelId,
        tab_id: TabId,
        sink: SnapshotSink,
    },
    /// Unbind a channel from a tab.
    Unsubscribe { channel_id: ChannelId, tab_id: TabId },
    /// Forget a disconnected channel.
    ChannelClosed(ChannelId),
    /// Purge a closed tab.
    TabClosed(TabId),
    /// Purge a replaced tab id.
    TabReplaced { old_tab_id: TabId, new_tab_id: TabId },
    /// Read a tab's counts.
    Snapshot {
        tab_id: TabId,
        reply: oneshot::Sender<DomainSnapshot>,
    },
    /// Read table sizes.
    Stats(oneshot::Sender<TrackerStats>),
    /// Stop the actor.
    Shutdown,
}

// ============================================================================
// Tracker
// ============================================================================

/// Handle to the tracking actor.
///
/// Cheap to clone; all clones drive the same actor. Methods enqueue a
/// command and return without waiting, except the queries.
///
/// # Example
///
/// ```ignore
/// use domain_tally::{ChannelId, RequestObserved, TabId, Tracker, TrackerConfig};
/// use domain_tally::tracker::snapshot_channel;
///
/// let tracker = Tracker::spawn(TrackerConfig::default())?;
///
/// let (sink, mut updates) = snapshot_channel();
/// tracker.subscribe(ChannelId::next(), TabId::new(5), sink)?;
///
/// tracker.observe(RequestObserved::main_frame(5, "https://www.example.com/"))?;
/// tracker.observe(RequestObserved::new(5, "https://cdn.example.com/app.js"))?;
///
/// while let Some(update) = updates.recv().await {
///     println!("{:?}", update.domains);
/// }
/// ```
#[derive(Clone)]
pub struct Tracker {
    /// Channel into the actor.
    command_tx: mpsc::UnboundedSender<TrackerCommand>,
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tracker - Constructor
// ============================================================================

impl Tracker {
    /// Validates `config` and spawns the actor on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(config: TrackerConfig) -> Result<Self> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (flush_tx, flush_rx) = mpsc::unbounded_channel();
        let state = TrackerState::new(&config, flush_tx);

        tokio::spawn(Self::run_event_loop(state, command_rx, flush_rx));

        info!(
            throttle_ms = config.throttle.as_millis() as u64,
            cache_capacity = config.cache_capacity,
            "Tracker started"
        );

        Ok(Self { command_tx })
    }
}

// ============================================================================
// Tracker - Ingestion & Lifecycle
// ============================================================================

impl Tracker {
    /// Enqueues an observed request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrackerClosed`] if the actor has stopped.
    pub fn observe(&self, event: RequestObserved) -> Result<()> {
        self.send(TrackerCommand::Observe(event))
    }

    /// Enqueues a tab-closed signal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrackerClosed`] if the actor has stopped.
    pub fn tab_closed(&self, tab_id: TabId) -> Result<()> {
        self.send(TrackerCommand::TabClosed(tab_id))
    }

    /// Enqueues a tab-replaced signal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrackerClosed`] if the actor has stopped.
    pub fn tab_replaced(&self, old_tab_id: TabId, new_tab_id: TabId) -> Result<()> {
        self.send(TrackerCommand::TabReplaced {
            old_tab_id,
            new_tab_id,
        })
    }
}

// ============================================================================
// Tracker - Subscriptions
// ============================================================================

impl Tracker {
    /// Binds a channel to a tab. The current counts are sent to `sink` as
    /// soon as the command is processed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrackerClosed`] if the actor has stopped.
    pub fn subscribe(&self, channel_id: ChannelId, tab_id: TabId, sink: SnapshotSink) -> Result<()> {
        self.send(TrackerCommand::Subscribe {
            channel_id,
            tab_id,
            sink,
        })
    }

    /// Unbinds a channel from a tab.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrackerClosed`] if the actor has stopped.
    pub fn unsubscribe(&self, channel_id: ChannelId, tab_id: TabId) -> Result<()> {
        self.send(TrackerCommand::Unsubscribe { channel_id, tab_id })
    }

    /// Reports that a channel disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrackerClosed`] if the actor has stopped.
    pub fn channel_closed(&self, channel_id: ChannelId) -> Result<()> {
        self.send(TrackerCommand::ChannelClosed(channel_id))
    }
}

// ============================================================================
// Tracker - Queries
// ============================================================================

impl Tracker {
    /// Returns the tab's current counts.
    ///
    /// Reflects every command enqueued before this call.
    ///
    /// # Errors
    ///
    /// - [`Error::TrackerClosed`] if the actor has stopped
    /// - [`Error::ChannelClosed`] if it stopped before replying
    pub async fn snapshot(&self, tab_id: TabId) -> Result<DomainSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(TrackerCommand::Snapshot { tab_id, reply })?;
        Ok(rx.await?)
    }

    /// Returns the sizes of the tracker's tables.
    ///
    /// # Errors
    ///
    /// - [`Error::TrackerClosed`] if the actor has stopped
    /// - [`Error::ChannelClosed`] if it stopped before replying
    pub async fn stats(&self) -> Result<TrackerStats> {
        let (reply, rx) = oneshot::channel();
        self.send(TrackerCommand::Stats(reply))?;
        Ok(rx.await?)
    }

    /// Returns `true` while the actor is accepting commands.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.command_tx.is_closed()
    }
}

// ============================================================================
// Tracker - Lifecycle
// ============================================================================

impl Tracker {
    /// Asks the actor to stop. Pending timers are cancelled.
    ///
    /// Commands already queued ahead of the shutdown are still applied.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(TrackerCommand::Shutdown);
    }

    /// Waits until the actor has stopped.
    pub async fn closed(&self) {
        self.command_tx.closed().await;
    }

    /// Sends a command to the actor.
    fn send(&self, command: TrackerCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| Error::TrackerClosed)
    }
}

// ============================================================================
// Tracker - Event Loop
// ============================================================================

impl Tracker {
    /// Actor loop: commands and timer expiries, one at a time.
    async fn run_event_loop(
        mut state: TrackerState,
        mut command_rx: mpsc::UnboundedReceiver<TrackerCommand>,
        mut flush_rx: mpsc::UnboundedReceiver<PendingFlush>,
    ) {
        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(command) => {
                            if Self::handle_command(&mut state, command).is_break() {
                                debug!("Shutdown command received");
                                break;
                            }
                        }

                        None => {
                            debug!("All tracker handles dropped");
                            break;
                        }
                    }
                }

                Some(flush) = flush_rx.recv() => {
                    state.flush(flush);
                }
            }
        }

        state.shutdown();
        command_rx.close();

        info!("Tracker stopped");
    }

    /// Applies one command to the state. Breaks on shutdown.
    fn handle_command(state: &mut TrackerState, command: TrackerCommand) -> ControlFlow<()> {
        match command {
            TrackerCommand::Observe(event) => state.observe(&event),

            TrackerCommand::Subscribe {
                channel_id,
                tab_id,
                sink,
            } => state.subscribe(channel_id, tab_id, sink),

            TrackerCommand::Unsubscribe { channel_id, tab_id } => {
                state.unsubscribe(channel_id, tab_id);
            }

            TrackerCommand::ChannelClosed(channel_id) => state.channel_closed(channel_id),

            TrackerCommand::TabClosed(tab_id) => state.tab_closed(tab_id),

            TrackerCommand::TabReplaced {
                old_tab_id,
                new_tab_id,
            } => state.tab_replaced(old_tab_id, new_tab_id),

            TrackerCommand::Snapshot { tab_id, reply } => {
                let _ = reply.send(state.snapshot(tab_id));
            }

            TrackerCommand::Stats(reply) => {
                let _ = reply.send(state.stats());
            }

            TrackerCommand::Shutdown => return ControlFlow::Break(()),
        }

        ControlFlow::Continue(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::time::timeout;

    use crate::tracker::snapshot_channel;

    const THROTTLE: Duration = Duration::from_millis(100);

    fn tracker() -> Tracker {
        Tracker::spawn(TrackerConfig::new().with_throttle(THROTTLE)).expect("spawn tracker")
    }

    #[tokio::test]
    async fn test_spawn_rejects_invalid_config() {
        let err = Tracker::spawn(TrackerConfig::new().with_throttle(Duration::ZERO)).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_then_snapshot() {
        let tracker = tracker();
        tracker
            .observe(RequestObserved::main_frame(1, "https://www.example.com/"))
            .expect("observe");
        tracker
            .observe(RequestObserved::new(1, "https://img.example.com/a.png"))
            .expect("observe");
        tracker
            .observe(RequestObserved::new(1, "https://fonts.gstatic.com/f.woff"))
            .expect("observe");

        let snapshot = tracker.snapshot(TabId::new(1)).await.expect("snapshot");
        assert_eq!(snapshot.count_of("example.com"), Some(2));
        assert_eq!(snapshot.count_of("gstatic.com"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriber_sees_initial_then_coalesced_update() {
        let tracker = tracker();
        for _ in 0..3 {
            tracker
                .observe(RequestObserved::new(9, "https://example.com/"))
                .expect("observe");
        }
        tracker
            .observe(RequestObserved::new(9, "https://other.org/"))
            .expect("observe");

        let (sink, mut updates) = snapshot_channel();
        tracker
            .subscribe(ChannelId::next(), TabId::new(9), sink)
            .expect("subscribe");

        let initial = updates.recv().await.expect("initial snapshot");
        assert_eq!(initial.domains.count_of("example.com"), Some(3));
        assert_eq!(initial.domains.count_of("other.org"), Some(1));

        for _ in 0..20 {
            tracker
                .observe(RequestObserved::new(9, "https://other.org/"))
                .expect("observe");
        }

        let update = updates.recv().await.expect("coalesced update");
        assert_eq!(update.domains.count_of("other.org"), Some(21));

        let extra = timeout(THROTTLE * 5, updates.recv()).await;
        assert!(extra.is_err(), "expected exactly one update per burst");
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_purges_state() {
        let tracker = tracker();
        tracker
            .observe(RequestObserved::new(2, "https://example.com/"))
            .expect("observe");
        tracker.tab_closed(TabId::new(2)).expect("close");

        let stats = tracker.stats().await.expect("stats");
        assert_eq!(stats.tabs, 0);
        assert_eq!(stats.pending_flushes, 0);
        assert!(tracker.snapshot(TabId::new(2)).await.expect("snapshot").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_purges_old_id() {
        let tracker = tracker();
        tracker
            .observe(RequestObserved::new(2, "https://example.com/"))
            .expect("observe");
        tracker
            .tab_replaced(TabId::new(2), TabId::new(3))
            .expect("replace");
        tracker
            .observe(RequestObserved::new(3, "https://example.com/"))
            .expect("observe");

        assert!(tracker.snapshot(TabId::new(2)).await.expect("snapshot").is_empty());
        assert_eq!(
            tracker
                .snapshot(TabId::new(3))
                .await
                .expect("snapshot")
                .count_of("example.com"),
            Some(1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_closed_cleans_registry() {
        let tracker = tracker();
        let channel = ChannelId::next();
        let (sink, _updates) = snapshot_channel();

        tracker.subscribe(channel, TabId::new(1), sink).expect("subscribe");
        assert_eq!(tracker.stats().await.expect("stats").channels, 1);

        tracker.channel_closed(channel).expect("close channel");
        let stats = tracker.stats().await.expect("stats");
        assert_eq!(stats.channels, 0);
        assert_eq!(stats.observed_tabs, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_ahead_of_shutdown_applied() {
        let tracker = tracker();
        tracker
            .observe(RequestObserved::new(4, "https://example.com/"))
            .expect("observe");

        let (sink, mut updates) = snapshot_channel();
        tracker
            .subscribe(ChannelId::next(), TabId::new(4), sink)
            .expect("subscribe");
        tracker.shutdown();
        tracker.closed().await;

        let initial = updates.recv().await.expect("initial snapshot");
        assert_eq!(initial.domains.count_of("example.com"), Some(1));
        assert!(updates.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_actor() {
        let tracker = tracker();
        assert!(tracker.is_running());

        tracker.shutdown();
        tracker.closed().await;

        assert!(!tracker.is_running());
        let err = tracker
            .observe(RequestObserved::new(1, "https://example.com/"))
            .unwrap_err();
        assert!(matches!(err, Error::TrackerClosed));
        assert!(tracker.stats().await.unwrap_err().is_tracker_gone());
    }
}
