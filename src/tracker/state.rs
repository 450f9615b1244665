//! Run-to-completion tracker state.
//!
//! [`TrackerState`] owns the aggregate store, the subscriber registry, the
//! scheduler, and the normalizer. Every entrypoint is a synchronous
//! `&mut self` method, so one event is fully applied before the next one
//! starts. The actor in [`service`](super::service) is the only caller in
//! production.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::config::TrackerConfig;
use crate::domain::DomainNormalizer;
use crate::identifiers::{ChannelId, TabId};
use crate::protocol::{RequestObserved, SnapshotUpdate};

use super::registry::{SnapshotSink, SubscriberRegistry};
use super::scheduler::{PendingFlush, UpdateScheduler};
use super::store::{AggregateStore, DomainSnapshot};

// ============================================================================
// TrackerStats
// ============================================================================

/// Sizes of the tracker's tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Tabs with counting state.
    pub tabs: usize,
    /// Tabs with at least one observer.
    pub observed_tabs: usize,
    /// Bound observer channels.
    pub channels: usize,
    /// Armed flush timers.
    pub pending_flushes: usize,
    /// Cached hostnames in the normalizer.
    pub cached_hosts: usize,
}

// ============================================================================
// TrackerState
// ============================================================================

/// All mutable tracking state.
pub struct TrackerState {
    normalizer: DomainNormalizer,
    store: AggregateStore,
    registry: SubscriberRegistry,
    scheduler: UpdateScheduler,
}

impl TrackerState {
    /// Creates empty state; timers report on `flush_tx`.
    #[must_use]
    pub fn new(config: &TrackerConfig, flush_tx: mpsc::UnboundedSender<PendingFlush>) -> Self {
        Self {
            normalizer: DomainNormalizer::with_capacity(config.cache_capacity),
            store: AggregateStore::new(),
            registry: SubscriberRegistry::new(),
            scheduler: UpdateScheduler::new(config.throttle, flush_tx),
        }
    }
}

// ============================================================================
// TrackerState - Ingestion
// ============================================================================

impl TrackerState {
    /// Applies one observed request.
    ///
    /// Negative tab ids are ignored. A main-frame request resets the tab
    /// before its own URL is counted. Requests without a root domain are
    /// never stored, but a main-frame one still schedules a flush so
    /// observers see the reset.
    pub fn observe(&mut self, event: &RequestObserved) {
        let Some(tab_id) = TabId::from_raw(event.tab_id) else {
            trace!(tab_id = event.tab_id, "Ignoring request outside any tab");
            return;
        };

        if event.is_main_frame {
            self.store.reset(tab_id);
            debug!(%tab_id, "Main-frame navigation, counts reset");
        }

        match self.normalizer.root_domain(&event.url) {
            Some(domain) => {
                let count = self.store.record(tab_id, domain);
                trace!(%tab_id, count, "Request counted");
                self.scheduler.schedule(tab_id);
            }
            None if event.is_main_frame => {
                self.scheduler.schedule(tab_id);
            }
            None => {
                trace!(%tab_id, "Request without root domain ignored");
            }
        }
    }
}

// ============================================================================
// TrackerState - Scheduling
// ============================================================================

impl TrackerState {
    /// Handles a fired timer.
    ///
    /// Stale flushes (cancelled or superseded timers) are dropped. A live
    /// flush removes its timer first, then pushes the current counts, empty
    /// if the tab has no state, to every observer of the tab. Returns the
    /// number of deliveries.
    pub fn flush(&mut self, flush: PendingFlush) -> usize {
        if !self.scheduler.take(flush) {
            return 0;
        }

        let tab_id = flush.tab_id;
        if !self.registry.has_subscribers(tab_id) {
            trace!(%tab_id, "Flush with no observers");
            return 0;
        }

        let update = Arc::new(SnapshotUpdate::new(tab_id, self.store.snapshot(tab_id)));
        let delivered = self.registry.broadcast(&update);
        debug!(%tab_id, domains = update.domains.len(), delivered, "Snapshot flushed");

        delivered
    }
}

// ============================================================================
// TrackerState - Subscriptions
// ============================================================================

impl TrackerState {
    /// Binds a channel to a tab and sends it the current counts at once.
    pub fn subscribe(&mut self, channel_id: ChannelId, tab_id: TabId, sink: SnapshotSink) {
        self.registry.bind(channel_id, tab_id, sink);
        debug!(%channel_id, %tab_id, "Channel subscribed");

        let update = Arc::new(SnapshotUpdate::new(tab_id, self.store.snapshot(tab_id)));
        if let Err(e) = self.registry.deliver_to(channel_id, &update) {
            debug!(%channel_id, %tab_id, error = %e, "Initial snapshot not delivered");
        }
    }

    /// Unbinds a channel from a tab. Pending timers are left alone.
    pub fn unsubscribe(&mut self, channel_id: ChannelId, tab_id: TabId) {
        if self.registry.unbind(channel_id, tab_id) {
            debug!(%channel_id, %tab_id, "Channel unsubscribed");
        }
    }

    /// Forgets a disconnected channel.
    pub fn channel_closed(&mut self, channel_id: ChannelId) {
        if let Some(tab_id) = self.registry.remove_channel(channel_id) {
            debug!(%channel_id, %tab_id, "Channel closed");
        }
    }
}

// ============================================================================
// TrackerState - Teardown
// ============================================================================

impl TrackerState {
    /// Purges a closed tab: cancels its timer, then drops its counts.
    ///
    /// Observers stay bound; they detach when their channels close.
    pub fn tab_closed(&mut self, tab_id: TabId) {
        let cancelled = self.scheduler.cancel(tab_id);
        let removed = self.store.remove(tab_id);
        debug!(%tab_id, cancelled, removed, "Tab torn down");
    }

    /// Tears down the retired id only; the new id starts fresh on ingestion.
    pub fn tab_replaced(&mut self, old_tab_id: TabId, new_tab_id: TabId) {
        debug!(old = %old_tab_id, new = %new_tab_id, "Tab replaced");
        self.tab_closed(old_tab_id);
    }

    /// Cancels all timers.
    pub fn shutdown(&mut self) {
        self.scheduler.cancel_all();
    }
}

// ============================================================================
// TrackerState - Queries
// ============================================================================

impl TrackerState {
    /// Current projection of a tab's counts.
    #[must_use]
    pub fn snapshot(&self, tab_id: TabId) -> DomainSnapshot {
        self.store.snapshot(tab_id)
    }

    /// Table sizes.
    #[must_use]
    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            tabs: self.store.tab_count(),
            observed_tabs: self.registry.tab_count(),
            channels: self.registry.channel_count(),
            pending_flushes: self.scheduler.pending_count(),
            cached_hosts: self.normalizer.cached_len(),
        }
    }

    /// Returns `true` if a flush is pending for the tab.
    #[inline]
    #[must_use]
    pub fn is_flush_pending(&self, tab_id: TabId) -> bool {
        self.scheduler.is_pending(tab_id)
    }

    /// Returns `true` if the tab has counting state.
    #[inline]
    #[must_use]
    pub fn has_counts(&self, tab_id: TabId) -> bool {
        self.store.contains(tab_id)
    }
}

// ============================================================================
// Tests
// ============================================================================
