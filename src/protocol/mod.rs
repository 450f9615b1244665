//! WebSocket protocol message types.
//!
//! Every frame is a JSON object tagged by `type`.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | `SUBSCRIBE_TAB` | Observer → Service | Bind (or rebind) the channel to a tab |
//! | `UNSUBSCRIBE_TAB` | Observer → Service | Unbind the channel from a tab |
//! | `PING` | Any → Service | Liveness check |
//! | `REQUEST_OBSERVED` | Capture → Service | One request seen in a tab |
//! | `TAB_CLOSED` | Host → Service | Tab removed |
//! | `TAB_REPLACED` | Host → Service | Tab id swapped (prerender, discard) |
//! | `TAB_DOMAINS_UPDATE` | Service → Observer | Current counts of a tab |
//! | `READY` | Service → Any | Answer to `PING` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `inbound` | Messages received by the service |
//! | `outbound` | Messages sent by the service |

// ============================================================================
// Submodules
// ============================================================================

/// Messages received by the service.
pub mod inbound;

/// Messages sent by the service.
pub mod outbound;

// ============================================================================
// Re-exports
// ============================================================================

pub use inbound::{InboundMessage, RequestObserved};
pub use outbound::{OutboundMessage, SnapshotUpdate};
