//! Per-tab domain tracking service.
//!
//! # Architecture
//!
//! ```text
//! RequestObserved ──► DomainNormalizer ──► AggregateStore ──► UpdateScheduler
//!                                                                   │ (throttle)
//!                                                                   ▼
//!                      SubscriberRegistry ◄── SnapshotUpdate ◄── flush
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `store` | Per-tab counts and snapshots |
//! | `registry` | Observer channels per tab |
//! | `scheduler` | One coalescing timer per tab |
//! | `state` | Run-to-completion event handlers |
//! | `service` | Actor task and [`Tracker`] handle |

// ============================================================================
// Submodules
// ============================================================================

/// Observer channels per tab.
pub mod registry;

/// One coalescing timer per tab.
pub mod scheduler;

/// Actor task and handle.
pub mod service;

/// Run-to-completion event handlers.
pub mod state;

/// Per-tab counts and snapshots.
pub mod store;

// ============================================================================
// Re-exports
// ============================================================================

pub use registry::{SnapshotSink, SnapshotStream, SubscriberRegistry, snapshot_channel};
pub use scheduler::{PendingFlush, UpdateScheduler};
pub use service::Tracker;
pub use state::{TrackerState, TrackerStats};
pub use store::{AggregateStore, DomainCount, DomainEntry, DomainSnapshot};
