//! Inbound message types.
//!
//! Tab ids arrive as signed integers: browsers use `-1` for requests outside
//! any tab. Validation into [`TabId`](crate::TabId) happens in the tracker,
//! where invalid ids are ignored.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::from_str;

use crate::error::{Error, Result};

// ============================================================================
// RequestObserved
// ============================================================================

/// A network request attributed to a tab by the capture mechanism.
///
/// # Format
///
/// ```json
/// {
///   "type": "REQUEST_OBSERVED",
///   "tabId": 5,
///   "url": "https://cdn.example.com/app.js",
///   "isMainFrame": false
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestObserved {
    /// Raw tab id; negative values are ignored.
    pub tab_id: i64,

    /// Requested URL.
    pub url: String,

    /// Top-level document load (starts a new epoch).
    #[serde(default)]
    pub is_main_frame: bool,
}

impl RequestObserved {
    /// Creates a sub-resource request event.
    #[inline]
    #[must_use]
    pub fn new(tab_id: i64, url: impl Into<String>) -> Self {
        Self {
            tab_id,
            url: url.into(),
            is_main_frame: false,
        }
    }

    /// Creates a main-frame navigation event.
    #[inline]
    #[must_use]
    pub fn main_frame(tab_id: i64, url: impl Into<String>) -> Self {
        Self {
            tab_id,
            url: url.into(),
            is_main_frame: true,
        }
    }
}

// ============================================================================
// InboundMessage
// ============================================================================

/// Any message the service accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum InboundMessage {
    /// Bind the sending channel to a tab.
    SubscribeTab {
        /// Tab to observe.
        tab_id: i64,
    },

    /// Unbind the sending channel from a tab.
    UnsubscribeTab {
        /// Tab to stop observing.
        tab_id: i64,
    },

    /// A request was observed.
    RequestObserved(RequestObserved),

    /// A tab was closed.
    TabClosed {
        /// Closed tab.
        tab_id: i64,
    },

    /// A tab id was replaced by another.
    TabReplaced {
        /// Id being retired.
        old_tab_id: i64,
        /// Id taking its place.
        new_tab_id: i64,
    },

    /// Liveness check.
    Ping,
}

impl InboundMessage {
    /// Parses a text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the frame is not valid JSON
    /// - [`Error::Protocol`] if it is JSON but matches no known message shape
    pub fn from_json(text: &str) -> Result<Self> {
        from_str(text).map_err(|e| {
            if e.is_data() {
                Error::protocol(format!("Unrecognised message: {e}"))
            } else {
                Error::Json(e)
            }
        })
    }

    /// Returns the wire name of the message type.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SubscribeTab { .. } => "SUBSCRIBE_TAB",
            Self::UnsubscribeTab { .. } => "UNSUBSCRIBE_TAB",
            Self::RequestObserved(_) => "REQUEST_OBSERVED",
            Self::TabClosed { .. } => "TAB_CLOSED",
            Self::TabReplaced { .. } => "TAB_REPLACED",
            Self::Ping => "PING",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
