//! Error types for the domain tracker.
//!
//! Malformed input (bad URLs, negative tab ids, unknown message shapes) is
//! never reported through this type: the ingestion path swallows it.
//! [`Error`] covers configuration, transport, and handle failures only.
//!
//! # Usage
//!
//! ```ignore
//! use domain_tally::{Result, Tracker, TrackerConfig};
//!
//! async fn example() -> Result<()> {
//!     let tracker = Tracker::spawn(TrackerConfig::default())?;
//!     let stats = tracker.stats().await?;
//!     assert_eq!(stats.tabs, 0);
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Protocol`] |
//! | Tracker | [`Error::TrackerClosed`], [`Error::DeliveryFailed`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::ChannelClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::ChannelId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when [`TrackerConfig`](crate::TrackerConfig) validation fails.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// WebSocket connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation.
    ///
    /// Only produced by explicit parsing helpers; the server discards
    /// unparseable frames instead of failing the connection.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Tracker Errors
    // ========================================================================
    /// The tracker actor has stopped.
    ///
    /// Returned by [`Tracker`](crate::Tracker) handle methods after shutdown.
    #[error("Tracker is not running")]
    TrackerClosed,

    /// Snapshot delivery to an observer channel failed.
    #[error("Delivery to channel {channel_id} failed")]
    DeliveryFailed {
        /// The channel whose receiver is gone.
        channel_id: ChannelId,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a delivery failure error.
    #[inline]
    pub fn delivery_failed(channel_id: ChannelId) -> Self {
        Self::DeliveryFailed { channel_id }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the tracker or its reply channel is gone.
    #[inline]
    #[must_use]
    pub fn is_tracker_gone(&self) -> bool {
        matches!(self, Self::TrackerClosed | Self::ChannelClosed(_))
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// A failed delivery only drops one observer; the tracker keeps running.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DeliveryFailed { .. } | Self::Protocol { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
