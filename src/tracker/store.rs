//! Per-tab domain counts.
//!
//! The store owns every count. A tab's [`DomainCount`] lives for one
//! navigation epoch: a main-frame request replaces it wholesale, and tab
//! teardown deletes it.

// ============================================================================
// Imports
// ============================================================================

use std::cmp::Ordering;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::identifiers::TabId;

// ============================================================================
// DomainEntry
// ============================================================================

/// One `{domain, count}` pair of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEntry {
    /// Root domain.
    pub domain: String,
    /// Requests attributed to it in the current epoch.
    pub count: u64,
}

impl DomainEntry {
    /// Creates an entry.
    #[inline]
    #[must_use]
    pub fn new(domain: impl Into<String>, count: u64) -> Self {
        Self {
            domain: domain.into(),
            count,
        }
    }
}

// ============================================================================
// DomainSnapshot
// ============================================================================

/// Immutable point-in-time projection of a tab's counts.
///
/// Entries are ordered by count (descending), then domain (ascending).
/// Consumers that need a specific order should still sort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainSnapshot {
    entries: Vec<DomainEntry>,
}

impl DomainSnapshot {
    /// Returns an empty snapshot.
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the entries.
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[DomainEntry] {
        &self.entries
    }

    /// Returns the number of distinct domains.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no domain has been counted.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up the count for a domain.
    #[must_use]
    pub fn count_of(&self, domain: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|entry| entry.domain == domain)
            .map(|entry| entry.count)
    }

    /// Sum of all counts.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|entry| entry.count).sum()
    }
}

impl FromIterator<DomainEntry> for DomainSnapshot {
    fn from_iter<I: IntoIterator<Item = DomainEntry>>(iter: I) -> Self {
        let mut entries: Vec<DomainEntry> = iter.into_iter().collect();
        entries.sort_by(presentation_order);
        Self { entries }
    }
}

fn presentation_order(left: &DomainEntry, right: &DomainEntry) -> Ordering {
    right
        .count
        .cmp(&left.count)
        .then_with(|| left.domain.cmp(&right.domain))
}

// ============================================================================
// DomainCount
// ============================================================================

/// Root domain to occurrence count for one tab and one epoch.
#[derive(Debug, Clone, Default)]
pub struct DomainCount {
    counts: FxHashMap<Arc<str>, u64>,
}

impl DomainCount {
    /// Adds one occurrence and returns the new count.
    pub fn increment(&mut self, domain: Arc<str>) -> u64 {
        let count = self.counts.entry(domain).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Returns the count for a domain (zero if absent).
    #[inline]
    #[must_use]
    pub fn get(&self, domain: &str) -> u64 {
        self.counts.get(domain).copied().unwrap_or(0)
    }

    /// Returns the number of distinct domains.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns `true` if nothing has been counted.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Projects the counts into a snapshot.
    #[must_use]
    pub fn snapshot(&self) -> DomainSnapshot {
        self.counts
            .iter()
            .map(|(domain, count)| DomainEntry::new(domain.as_ref(), *count))
            .collect()
    }
}

// ============================================================================
// AggregateStore
// ============================================================================

/// All per-tab counting state.
#[derive(Debug, Default)]
pub struct AggregateStore {
    tabs: FxHashMap<TabId, DomainCount>,
}

impl AggregateStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new epoch: the tab's counts are replaced with an empty map.
    pub fn reset(&mut self, tab_id: TabId) {
        self.tabs.insert(tab_id, DomainCount::default());
    }

    /// Counts one request, creating the tab's map lazily.
    ///
    /// Returns the domain's new count.
    pub fn record(&mut self, tab_id: TabId, domain: Arc<str>) -> u64 {
        self.tabs.entry(tab_id).or_default().increment(domain)
    }

    /// Returns the tab's counts, if any.
    #[inline]
    #[must_use]
    pub fn get(&self, tab_id: TabId) -> Option<&DomainCount> {
        self.tabs.get(&tab_id)
    }

    /// Projects the tab's counts; absent tabs yield an empty snapshot.
    #[must_use]
    pub fn snapshot(&self, tab_id: TabId) -> DomainSnapshot {
        self.tabs
            .get(&tab_id)
            .map(DomainCount::snapshot)
            .unwrap_or_default()
    }

    /// Deletes the tab's counts. Returns `true` if there were any.
    pub fn remove(&mut self, tab_id: TabId) -> bool {
        self.tabs.remove(&tab_id).is_some()
    }

    /// Returns `true` if the tab has counting state.
    #[inline]
    #[must_use]
    pub fn contains(&self, tab_id: TabId) -> bool {
        self.tabs.contains_key(&tab_id)
    }

    /// Returns the number of tabs with counting state.
    #[inline]
    #[must_use]
    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn domain(name: &str) -> Arc<str> {
        Arc::from(name)
    }

    #[test]
    fn test_record_creates_tab_lazily() {
        let mut store = AggregateStore::new();
        let tab = TabId::new(1);

        assert!(!store.contains(tab));
        assert_eq!(store.record(tab, domain("example.com")), 1);
        assert_eq!(store.record(tab, domain("example.com")), 2);
        assert_eq!(store.record(tab, domain("other.org")), 1);

        let counts = store.get(tab).expect("tab exists");
        assert_eq!(counts.get("example.com"), 2);
        assert_eq!(counts.get("other.org"), 1);
        assert_eq!(counts.get("missing.net"), 0);
    }

    #[test]
    fn test_reset_replaces_counts() {
        let mut store = AggregateStore::new();
        let tab = TabId::new(1);

        store.record(tab, domain("example.com"));
        store.reset(tab);

        assert!(store.contains(tab));
        assert!(store.get(tab).expect("tab exists").is_empty());
    }

    #[test]
    fn test_tabs_are_isolated() {
        let mut store = AggregateStore::new();
        store.record(TabId::new(1), domain("example.com"));
        store.record(TabId::new(2), domain("example.com"));
        store.reset(TabId::new(1));

        assert_eq!(store.snapshot(TabId::new(1)).len(), 0);
        assert_eq!(store.snapshot(TabId::new(2)).count_of("example.com"), Some(1));
    }

    #[test]
    fn test_snapshot_of_missing_tab_is_empty() {
        let store = AggregateStore::new();
        assert!(store.snapshot(TabId::new(99)).is_empty());
    }

    #[test]
    fn test_remove() {
        let mut store = AggregateStore::new();
        store.record(TabId::new(3), domain("example.com"));

        assert!(store.remove(TabId::new(3)));
        assert!(!store.remove(TabId::new(3)));
        assert_eq!(store.tab_count(), 0);
    }

    #[test]
    fn test_snapshot_ordering() {
        let mut store = AggregateStore::new();
        let tab = TabId::new(1);
        for name in ["b.com", "a.com", "c.com", "c.com", "a.com", "c.com"] {
            store.record(tab, domain(name));
        }

        let snapshot = store.snapshot(tab);
        let order: Vec<_> = snapshot.entries().iter().map(|e| e.domain.as_str()).collect();
        assert_eq!(order, ["c.com", "a.com", "b.com"]);
        assert_eq!(snapshot.total(), 6);
    }

    #[test]
    fn test_snapshot_serializes_as_array() {
        let snapshot: DomainSnapshot = [DomainEntry::new("example.com", 3)].into_iter().collect();
        let json = serde_json::to_string(&snapshot).expect("serialize");
        assert_eq!(json, r#"[{"domain":"example.com","count":3}]"#);
    }
}
