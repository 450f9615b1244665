//! Outbound message types.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::to_string;

use crate::error::Result;
use crate::identifiers::TabId;
use crate::tracker::DomainSnapshot;

// ============================================================================
// SnapshotUpdate
// ============================================================================

/// Current domain counts of one tab, as pushed to its observers.
///
/// # Format
///
/// ```json
/// {
///   "type": "TAB_DOMAINS_UPDATE",
///   "tabId": 5,
///   "domains": [{ "domain": "example.com", "count": 3 }]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotUpdate {
    /// Tab the counts belong to.
    pub tab_id: TabId,

    /// Counts at the time the update was built.
    pub domains: DomainSnapshot,
}

impl SnapshotUpdate {
    /// Creates an update.
    #[inline]
    #[must_use]
    pub fn new(tab_id: TabId, domains: DomainSnapshot) -> Self {
        Self { tab_id, domains }
    }
}

// ============================================================================
// OutboundMessage
// ============================================================================

/// Any message the service sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundMessage {
    /// Snapshot push.
    TabDomainsUpdate(SnapshotUpdate),

    /// Answer to `PING`.
    Ready,
}

impl OutboundMessage {
    /// Serializes to a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(to_string(self)?)
    }
}

impl From<SnapshotUpdate> for OutboundMessage {
    fn from(update: SnapshotUpdate) -> Self {
        Self::TabDomainsUpdate(update)
    }
}

// ============================================================================
// Tests
// ============================================================================
