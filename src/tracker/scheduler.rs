//! Per-tab coalescing throttle.
//!
//! At most one timer is armed per tab. When it fires, a [`PendingFlush`] is
//! posted to the tracker, which builds the snapshot from the state at that
//! moment (trailing edge). Each timer carries a token; a flush whose token no
//! longer matches the armed timer is stale and must be ignored.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::identifiers::TabId;

// ============================================================================
// PendingFlush
// ============================================================================

/// Timer expiry notice for one tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingFlush {
    /// Tab to flush.
    pub tab_id: TabId,
    /// Token of the timer that fired.
    pub token: u64,
}

// ============================================================================
// UpdateScheduler
// ============================================================================

/// Armed timer for one tab.
#[derive(Debug)]
struct PendingTimer {
    token: u64,
    handle: AbortHandle,
}

/// One optional outstanding timer per tab.
///
/// Timers are spawned tokio tasks; arming requires a runtime context.
#[derive(Debug)]
pub struct UpdateScheduler {
    /// Coalescing delay.
    delay: Duration,
    /// Armed timers.
    timers: FxHashMap<TabId, PendingTimer>,
    /// Next timer token.
    next_token: u64,
    /// Where expired timers report.
    flush_tx: mpsc::UnboundedSender<PendingFlush>,
}

impl UpdateScheduler {
    /// Creates a scheduler whose timers report on `flush_tx`.
    #[must_use]
    pub fn new(delay: Duration, flush_tx: mpsc::UnboundedSender<PendingFlush>) -> Self {
        Self {
            delay,
            timers: FxHashMap::default(),
            next_token: 1,
            flush_tx,
        }
    }

    /// Arms a timer for `tab_id` unless one is already pending.
    ///
    /// Returns `true` if a new timer was armed.
    pub fn schedule(&mut self, tab_id: TabId) -> bool {
        if self.timers.contains_key(&tab_id) {
            trace!(%tab_id, "Flush already pending");
            return false;
        }

        let token = self.next_token;
        self.next_token += 1;

        let delay = self.delay;
        let flush_tx = self.flush_tx.clone();
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            // Receiver gone means the tracker stopped
            let _ = flush_tx.send(PendingFlush { tab_id, token });
        })
        .abort_handle();

        self.timers.insert(tab_id, PendingTimer { token, handle });
        trace!(%tab_id, token, delay_ms = delay.as_millis() as u64, "Flush scheduled");

        true
    }

    /// Consumes a fired timer.
    ///
    /// Removes the entry and returns `true` only if `flush` belongs to the
    /// currently armed timer; stale or cancelled flushes return `false`.
    pub fn take(&mut self, flush: PendingFlush) -> bool {
        match self.timers.get(&flush.tab_id) {
            Some(timer) if timer.token == flush.token => {
                self.timers.remove(&flush.tab_id);
                true
            }
            _ => {
                debug!(tab_id = %flush.tab_id, token = flush.token, "Ignoring stale flush");
                false
            }
        }
    }

    /// Cancels the tab's pending timer. Returns `true` if one was armed.
    pub fn cancel(&mut self, tab_id: TabId) -> bool {
        let Some(timer) = self.timers.remove(&tab_id) else {
            return false;
        };

        timer.handle.abort();
        trace!(%tab_id, token = timer.token, "Flush cancelled");
        true
    }

    /// Cancels every pending timer.
    pub fn cancel_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }

    /// Returns `true` if a timer is armed for the tab.
    #[inline]
    #[must_use]
    pub fn is_pending(&self, tab_id: TabId) -> bool {
        self.timers.contains_key(&tab_id)
    }

    /// Returns the number of armed timers.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for UpdateScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

// ============================================================================
// Tests
// ============================================================================
