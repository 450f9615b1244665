//! Observer channels per tab.
//!
//! A channel is bound to at most one tab. The registry keeps both
//! directions (tab → channels, channel → tab) so rebinding and disconnects
//! are O(1), and it never keeps an empty channel set around.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ChannelId, TabId};
use crate::protocol::SnapshotUpdate;

// ============================================================================
// Observer Channel
// ============================================================================

/// Sending half of an observer channel.
///
/// Holds one slot: a send replaces whatever the stream has not read yet, so
/// a slow observer only ever sees the latest snapshot. Sends fail once every
/// [`SnapshotStream`] is dropped, which is how a disconnected observer is
/// detected.
#[derive(Debug, Clone)]
pub struct SnapshotSink {
    tx: Arc<watch::Sender<Option<Arc<SnapshotUpdate>>>>,
}

impl SnapshotSink {
    /// Replaces the pending update.
    ///
    /// Returns `false` without storing anything if the stream is gone.
    pub fn send(&self, update: Arc<SnapshotUpdate>) -> bool {
        if self.tx.is_closed() {
            return false;
        }

        self.tx.send_replace(Some(update));
        true
    }

    /// Returns `true` once the stream is dropped.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of an observer channel.
#[derive(Debug)]
pub struct SnapshotStream {
    rx: watch::Receiver<Option<Arc<SnapshotUpdate>>>,
}

impl SnapshotStream {
    /// Waits for an update not yet seen.
    ///
    /// Returns `None` once every sink is dropped and the last update was
    /// read. Cancel safe.
    pub async fn recv(&mut self) -> Option<Arc<SnapshotUpdate>> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(update) = self.rx.borrow_and_update().clone() {
                return Some(update);
            }
        }
    }

    /// Takes the pending update, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<SnapshotUpdate>> {
        if !self.rx.has_changed().unwrap_or(false) {
            return None;
        }
        self.rx.borrow_and_update().clone()
    }
}

/// Creates a connected sink/stream pair.
#[must_use]
pub fn snapshot_channel() -> (SnapshotSink, SnapshotStream) {
    let (tx, rx) = watch::channel(None);
    (SnapshotSink { tx: Arc::new(tx) }, SnapshotStream { rx })
}

// ============================================================================
// SubscriberRegistry
// ============================================================================

/// Tab to subscribed channels.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    /// Channels bound to each tab. Never holds an empty map.
    subscribers: FxHashMap<TabId, FxHashMap<ChannelId, SnapshotSink>>,
    /// Reverse index: the tab each channel is bound to.
    bindings: FxHashMap<ChannelId, TabId>,
}

impl SubscriberRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `channel_id` to `tab_id`, detaching it from any previous tab.
    ///
    /// Returns the previous tab if the channel moved.
    pub fn bind(
        &mut self,
        channel_id: ChannelId,
        tab_id: TabId,
        sink: SnapshotSink,
    ) -> Option<TabId> {
        let previous = self
            .bindings
            .insert(channel_id, tab_id)
            .filter(|previous| *previous != tab_id);

        if let Some(previous) = previous {
            self.detach(previous, channel_id);
            debug!(%channel_id, from = %previous, to = %tab_id, "Channel rebound");
        }

        self.subscribers
            .entry(tab_id)
            .or_default()
            .insert(channel_id, sink);

        previous
    }

    /// Unbinds `channel_id` from `tab_id`.
    ///
    /// No-op if the channel is bound elsewhere. Returns `true` if removed.
    pub fn unbind(&mut self, channel_id: ChannelId, tab_id: TabId) -> bool {
        if self.bindings.get(&channel_id) != Some(&tab_id) {
            return false;
        }

        self.bindings.remove(&channel_id);
        self.detach(tab_id, channel_id)
    }

    /// Removes a channel wherever it is bound.
    ///
    /// Returns the tab it was bound to.
    pub fn remove_channel(&mut self, channel_id: ChannelId) -> Option<TabId> {
        let tab_id = self.bindings.remove(&channel_id)?;
        self.detach(tab_id, channel_id);
        Some(tab_id)
    }

    /// Sends `update` to every channel of its tab.
    ///
    /// Channels whose send fails are removed; the rest still receive the
    /// update. Returns the number of successful deliveries.
    pub fn broadcast(&mut self, update: &Arc<SnapshotUpdate>) -> usize {
        let tab_id = update.tab_id;
        let Some(channels) = self.subscribers.get_mut(&tab_id) else {
            return 0;
        };

        let mut stale = Vec::new();
        for (channel_id, sink) in channels.iter() {
            if !sink.send(Arc::clone(update)) {
                stale.push(*channel_id);
            }
        }

        let delivered = channels.len() - stale.len();

        for channel_id in &stale {
            channels.remove(channel_id);
            self.bindings.remove(channel_id);
            warn!(%channel_id, %tab_id, "Dropping unreachable observer channel");
        }

        if channels.is_empty() {
            self.subscribers.remove(&tab_id);
        }

        delivered
    }

    /// Sends `update` to a single channel.
    ///
    /// A failed send removes the channel.
    ///
    /// # Errors
    ///
    /// - [`Error::DeliveryFailed`] if the channel's receiver is gone or the
    ///   channel is not bound to the update's tab
    pub fn deliver_to(&mut self, channel_id: ChannelId, update: &Arc<SnapshotUpdate>) -> Result<()> {
        let sent = self
            .subscribers
            .get(&update.tab_id)
            .and_then(|channels| channels.get(&channel_id))
            .is_some_and(|sink| sink.send(Arc::clone(update)));

        if sent {
            return Ok(());
        }

        if self.remove_channel(channel_id).is_some() {
            warn!(%channel_id, tab_id = %update.tab_id, "Dropping unreachable observer channel");
        }

        Err(Error::delivery_failed(channel_id))
    }

    /// Returns the tab a channel is bound to.
    #[inline]
    #[must_use]
    pub fn binding(&self, channel_id: ChannelId) -> Option<TabId> {
        self.bindings.get(&channel_id).copied()
    }

    /// Returns the number of channels bound to a tab.
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self, tab_id: TabId) -> usize {
        self.subscribers.get(&tab_id).map_or(0, FxHashMap::len)
    }

    /// Returns `true` if the tab has at least one channel.
    #[inline]
    #[must_use]
    pub fn has_subscribers(&self, tab_id: TabId) -> bool {
        self.subscribers.contains_key(&tab_id)
    }

    /// Returns the number of tabs with subscribers.
    #[inline]
    #[must_use]
    pub fn tab_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns the number of bound channels.
    #[inline]
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.bindings.len()
    }

    /// Removes one channel from a tab's set, dropping the set if empty.
    fn detach(&mut self, tab_id: TabId, channel_id: ChannelId) -> bool {
        let Some(channels) = self.subscribers.get_mut(&tab_id) else {
            return false;
        };

        let removed = channels.remove(&channel_id).is_some();
        if channels.is_empty() {
            self.subscribers.remove(&tab_id);
        }

        removed
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::tracker::{DomainEntry, DomainSnapshot};

    fn update(tab: u64) -> Arc<SnapshotUpdate> {
        Arc::new(SnapshotUpdate::new(TabId::new(tab), DomainSnapshot::empty()))
    }

    #[test]
    fn test_bind_and_broadcast() {
        let mut registry = SubscriberRegistry::new();
        let (sink_a, mut stream_a) = snapshot_channel();
        let (sink_b, mut stream_b) = snapshot_channel();

        registry.bind(ChannelId::from_raw(1), TabId::new(5), sink_a);
        registry.bind(ChannelId::from_raw(2), TabId::new(5), sink_b);

        assert_eq!(registry.broadcast(&update(5)), 2);
        assert!(stream_a.try_recv().is_some());
        assert!(stream_b.try_recv().is_some());
    }

    #[test]
    fn test_rebind_moves_channel() {
        let mut registry = SubscriberRegistry::new();
        let channel = ChannelId::from_raw(1);
        let (sink, mut stream) = snapshot_channel();

        assert_eq!(registry.bind(channel, TabId::new(5), sink.clone()), None);
        assert_eq!(registry.bind(channel, TabId::new(7), sink), Some(TabId::new(5)));

        assert!(!registry.has_subscribers(TabId::new(5)));
        assert_eq!(registry.binding(channel), Some(TabId::new(7)));

        assert_eq!(registry.broadcast(&update(5)), 0);
        assert!(stream.try_recv().is_none());
        assert_eq!(registry.broadcast(&update(7)), 1);
        assert!(stream.try_recv().is_some());
    }

    #[test]
    fn test_rebind_same_tab_is_not_a_move() {
        let mut registry = SubscriberRegistry::new();
        let channel = ChannelId::from_raw(1);
        let (sink, _stream) = snapshot_channel();

        registry.bind(channel, TabId::new(5), sink.clone());
        assert_eq!(registry.bind(channel, TabId::new(5), sink), None);
        assert_eq!(registry.subscriber_count(TabId::new(5)), 1);
    }

    #[test]
    fn test_unbind_requires_matching_tab() {
        let mut registry = SubscriberRegistry::new();
        let channel = ChannelId::from_raw(1);
        let (sink, _stream) = snapshot_channel();
        registry.bind(channel, TabId::new(5), sink);

        assert!(!registry.unbind(channel, TabId::new(6)));
        assert!(registry.unbind(channel, TabId::new(5)));
        assert_eq!(registry.tab_count(), 0);
        assert_eq!(registry.channel_count(), 0);
    }

    #[test]
    fn test_broadcast_drops_failed_channel_only() {
        let mut registry = SubscriberRegistry::new();
        let (sink_a, stream_a) = snapshot_channel();
        let (sink_b, mut stream_b) = snapshot_channel();

        registry.bind(ChannelId::from_raw(1), TabId::new(5), sink_a);
        registry.bind(ChannelId::from_raw(2), TabId::new(5), sink_b);
        drop(stream_a);

        assert_eq!(registry.broadcast(&update(5)), 1);
        assert!(stream_b.try_recv().is_some());
        assert_eq!(registry.subscriber_count(TabId::new(5)), 1);
        assert_eq!(registry.binding(ChannelId::from_raw(1)), None);
    }

    #[test]
    fn test_broadcast_removes_emptied_set() {
        let mut registry = SubscriberRegistry::new();
        let (sink, stream) = snapshot_channel();
        registry.bind(ChannelId::from_raw(1), TabId::new(5), sink);
        drop(stream);

        assert_eq!(registry.broadcast(&update(5)), 0);
        assert_eq!(registry.tab_count(), 0);
        assert_eq!(registry.channel_count(), 0);
    }

    #[test]
    fn test_deliver_to_single_channel() {
        let mut registry = SubscriberRegistry::new();
        let (sink_a, mut stream_a) = snapshot_channel();
        let (sink_b, mut stream_b) = snapshot_channel();
        registry.bind(ChannelId::from_raw(1), TabId::new(5), sink_a);
        registry.bind(ChannelId::from_raw(2), TabId::new(5), sink_b);

        registry
            .deliver_to(ChannelId::from_raw(1), &update(5))
            .expect("deliver");

        assert!(stream_a.try_recv().is_some());
        assert!(stream_b.try_recv().is_none());
    }

    #[test]
    fn test_deliver_to_closed_channel_fails() {
        let mut registry = SubscriberRegistry::new();
        let (sink, stream) = snapshot_channel();
        registry.bind(ChannelId::from_raw(1), TabId::new(5), sink);
        drop(stream);

        let err = registry
            .deliver_to(ChannelId::from_raw(1), &update(5))
            .unwrap_err();
        assert!(matches!(err, Error::DeliveryFailed { .. }));
        assert_eq!(registry.tab_count(), 0);
    }

    #[test]
    fn test_remove_channel() {
        let mut registry = SubscriberRegistry::new();
        let (sink, _stream) = snapshot_channel();
        registry.bind(ChannelId::from_raw(1), TabId::new(5), sink.clone());
        registry.bind(ChannelId::from_raw(2), TabId::new(5), sink.clone());
        registry.bind(ChannelId::from_raw(3), TabId::new(6), sink);

        assert_eq!(registry.remove_channel(ChannelId::from_raw(3)), Some(TabId::new(6)));
        assert_eq!(registry.remove_channel(ChannelId::from_raw(3)), None);
        assert_eq!(registry.remove_channel(ChannelId::from_raw(1)), Some(TabId::new(5)));
        assert_eq!(registry.subscriber_count(TabId::new(5)), 1);
        assert_eq!(registry.remove_channel(ChannelId::from_raw(2)), Some(TabId::new(5)));
        assert_eq!(registry.tab_count(), 0);
        assert_eq!(registry.channel_count(), 0);
    }

    #[test]
    fn test_unread_stream_keeps_only_latest() {
        let mut registry = SubscriberRegistry::new();
        let (sink, mut stream) = snapshot_channel();
        registry.bind(ChannelId::from_raw(1), TabId::new(5), sink);

        for count in 1..=50 {
            let domains = DomainSnapshot::from_iter([DomainEntry::new("example.com", count)]);
            let update = Arc::new(SnapshotUpdate::new(TabId::new(5), domains));
            assert_eq!(registry.broadcast(&update), 1);
        }

        let latest = stream.try_recv().expect("pending update");
        assert_eq!(latest.domains.count_of("example.com"), Some(50));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_stream_recv_skips_superseded() {
        let (sink, mut stream) = snapshot_channel();
        assert!(sink.send(update(1)));
        assert!(sink.send(update(2)));

        let received = stream.recv().await.expect("update");
        assert_eq!(received.tab_id, TabId::new(2));
        assert!(stream.try_recv().is_none());

        drop(sink);
        assert!(stream.recv().await.is_none());
    }

    #[test]
    fn test_sink_reports_closed_stream() {
        let (sink, stream) = snapshot_channel();
        assert!(!sink.is_closed());

        drop(stream);
        assert!(sink.is_closed());
        assert!(!sink.send(update(1)));
    }
}
