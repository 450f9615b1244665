//! WebSocket transport layer.
//!
//! Hosts a [`Tracker`](crate::tracker::Tracker) for out-of-process peers:
//! the request capture mechanism, the tab lifecycle relay and observers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                           ┌─────────────────┐
//! │  TrackerServer   │        WebSocket          │  Capture hook   │
//! │                  │◄─────────────────────────►│  Lifecycle feed │
//! │  PeerConnection  │     bind_addr:PORT        │  Popup observer │
//! │  (one per peer)  │                           │                 │
//! └────────┬─────────┘                           └─────────────────┘
//!          │ commands / snapshot pushes
//!          ▼
//!      Tracker actor
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `TrackerServer::bind` - Bind and start the accept loop
//! 2. Peer connects; the socket is upgraded and gets a fresh channel id
//! 3. `PeerConnection::run` - Dispatch frames, push snapshots
//! 4. Socket closes; the channel is released from the tracker
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Per-peer event loop |
//! | `server` | Listener and accept loop |

// ============================================================================
// Submodules
// ============================================================================

/// Per-peer event loop.
pub mod connection;

/// Listener and accept loop.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::PeerConnection;
pub use server::TrackerServer;
