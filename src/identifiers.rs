//! Type-safe identifiers.
//!
//! Newtype wrappers keep tab ids (supplied by the browser) and channel ids
//! (minted by this crate) from being mixed up.
//!
//! | Type | Origin | Notes |
//! |------|--------|-------|
//! | [`TabId`] | Browser | Non-negative; negative wire values are rejected |
//! | [`ChannelId`] | Tracker | Process-unique, monotonically increasing |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// TabId
// ============================================================================

/// Identifier of a browser tab.
///
/// Browsers report `-1` for requests not tied to a tab, so the wire type is
/// signed. Use [`TabId::from_raw`] at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(u64);

impl TabId {
    /// Creates a tab id from an unsigned value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Converts a raw wire value, rejecting negatives.
    #[inline]
    #[must_use]
    pub fn from_raw(raw: i64) -> Option<Self> {
        u64::try_from(raw).ok().map(Self)
    }

    /// Returns the inner value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ChannelId
// ============================================================================

/// Global counter for channel ids.
static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of an observer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Allocates the next process-unique channel id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps an existing value.
    #[inline]
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the inner value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
