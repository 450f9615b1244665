//! Domain Tally - per-tab root-domain request tracking.
//!
//! This library counts the network requests each browser tab makes, grouped
//! by the registrable ("root") domain of the request URL, and pushes
//! throttled snapshots of those counts to subscribed observers.
//!
//! # Architecture
//!
//! The tracker follows a single-writer model:
//!
//! - **Producers**: the request capture mechanism and the tab lifecycle feed
//!   post events to the [`Tracker`]
//! - **Tracker actor**: owns all state, coalesces updates per tab
//! - **Observers**: receive [`SnapshotUpdate`] pushes for the tab they
//!   subscribed to
//!
//! Key design principles:
//!
//! - A new top-level navigation resets the tab's counts
//! - At most one pending update per tab; snapshots reflect the state at
//!   flush time (trailing edge)
//! - Disconnected observers are pruned on the first failed delivery
//!
//! # Quick Start
//!
//! ```no_run
//! use domain_tally::{RequestObserved, Result, TabId, Tracker, TrackerConfig};
//! use domain_tally::tracker::snapshot_channel;
//! use domain_tally::identifiers::ChannelId;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let tracker = Tracker::spawn(TrackerConfig::default())?;
//!
//!     // Observe tab 7
//!     let (sink, mut updates) = snapshot_channel();
//!     tracker.subscribe(ChannelId::next(), TabId::new(7), sink)?;
//!
//!     // Report requests
//!     tracker.observe(RequestObserved::main_frame(7, "https://www.example.com/"))?;
//!     tracker.observe(RequestObserved::new(7, "https://cdn.example.com/app.js"))?;
//!
//!     while let Some(update) = updates.recv().await {
//!         println!("{:?}", update.domains);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Tracker configuration |
//! | [`domain`] | URL to root-domain normalization |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | WebSocket message types |
//! | [`tracker`] | Aggregate store, subscribers, throttle and actor |
//! | [`transport`] | WebSocket server |

// ============================================================================
// Modules
// ============================================================================

/// Tracker configuration.
pub mod config;

/// URL to root-domain normalization.
///
/// See [`DomainNormalizer`] for the suffix heuristic and cache.
pub mod domain;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for tabs and observer channels.
pub mod identifiers;

/// WebSocket protocol message types.
pub mod protocol;

/// Per-tab domain counting and snapshot delivery.
pub mod tracker;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::TrackerConfig;

// Domain normalization
pub use domain::{DomainNormalizer, UNKNOWN_DOMAIN};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ChannelId, TabId};

// Protocol types
pub use protocol::{InboundMessage, OutboundMessage, RequestObserved, SnapshotUpdate};

// Tracker types
pub use tracker::{DomainEntry, DomainSnapshot, Tracker, TrackerStats};

// Transport types
pub use transport::TrackerServer;
