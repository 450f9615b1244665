//! One WebSocket peer.
//!
//! A peer may be an observer (popup), the capture mechanism, the host
//! lifecycle relay, or any mix of them: every peer gets an observer channel
//! id, and only `SUBSCRIBE_TAB` actually binds it.
//!
//! # Event Loop
//!
//! Each connection runs one task that handles:
//!
//! - Incoming frames, parsed into [`InboundMessage`] and forwarded to the
//!   tracker
//! - Snapshot updates for this peer's channel, written back as text frames
//! - Channel cleanup when the socket closes or a write fails

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};

use crate::error::Result;
use crate::identifiers::{ChannelId, TabId};
use crate::protocol::{InboundMessage, OutboundMessage, SnapshotUpdate};
use crate::tracker::{SnapshotSink, Tracker, snapshot_channel};

// ============================================================================
// Types
// ============================================================================

type WsSink = futures_util::stream::SplitSink<WebSocketStream<TcpStream>, Message>;

// ============================================================================
// PeerConnection
// ============================================================================

/// Server side of one WebSocket peer.
pub struct PeerConnection {
    /// Observer channel id of this peer.
    channel_id: ChannelId,
    /// Remote address, for logging.
    addr: SocketAddr,
    /// Tracker handle.
    tracker: Tracker,
}

impl PeerConnection {
    /// Creates a connection handler with a fresh channel id.
    #[must_use]
    pub fn new(addr: SocketAddr, tracker: Tracker) -> Self {
        Self {
            channel_id: ChannelId::next(),
            addr,
            tracker,
        }
    }

    /// Returns this peer's channel id.
    #[inline]
    #[must_use]
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Runs the connection until the socket closes or the tracker stops.
    ///
    /// The channel is always reported closed to the tracker on exit.
    pub async fn run(self, ws_stream: WebSocketStream<TcpStream>) {
        let (sink, mut updates) = snapshot_channel();
        let (mut ws_write, mut ws_read) = ws_stream.split();

        debug!(channel_id = %self.channel_id, addr = ?self.addr, "Peer loop started");

        loop {
            tokio::select! {
                // Incoming frames from the peer
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            match self.handle_incoming_message(&text, &sink) {
                                Ok(Some(reply)) => {
                                    if let Err(e) = Self::send_message(&mut ws_write, &reply).await {
                                        warn!(channel_id = %self.channel_id, error = %e, "Failed to send reply");
                                        break;
                                    }
                                }
                                Ok(None) => {}
                                Err(e) => {
                                    warn!(channel_id = %self.channel_id, error = %e, "Tracker unavailable");
                                    break;
                                }
                            }
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!(channel_id = %self.channel_id, "WebSocket closed by peer");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(channel_id = %self.channel_id, error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!(channel_id = %self.channel_id, "WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Snapshot pushes for this peer's channel
                update = updates.recv() => {
                    let Some(update) = update else {
                        break;
                    };

                    if let Err(e) = self.send_update(&mut ws_write, &update).await {
                        warn!(channel_id = %self.channel_id, error = %e, "Failed to push snapshot");
                        break;
                    }
                }
            }
        }

        // Stop receiving before the tracker learns of the disconnect
        drop(updates);
        let _ = self.tracker.channel_closed(self.channel_id);
        let _ = ws_write.close().await;

        debug!(channel_id = %self.channel_id, addr = ?self.addr, "Peer loop terminated");
    }

    /// Dispatches one text frame.
    ///
    /// Unparseable frames and invalid tab ids are dropped. Returns a reply to
    /// send back, if any.
    fn handle_incoming_message(
        &self,
        text: &str,
        sink: &SnapshotSink,
    ) -> Result<Option<OutboundMessage>> {
        let message = match InboundMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(channel_id = %self.channel_id, error = %e, "Discarding unrecognised frame");
                return Ok(None);
            }
        };

        trace!(channel_id = %self.channel_id, kind = message.kind(), "Frame received");

        match message {
            InboundMessage::RequestObserved(event) => self.tracker.observe(event)?,

            InboundMessage::SubscribeTab { tab_id } => {
                if let Some(tab_id) = self.valid_tab(tab_id) {
                    self.tracker
                        .subscribe(self.channel_id, tab_id, sink.clone())?;
                }
            }

            InboundMessage::UnsubscribeTab { tab_id } => {
                if let Some(tab_id) = self.valid_tab(tab_id) {
                    self.tracker.unsubscribe(self.channel_id, tab_id)?;
                }
            }

            InboundMessage::TabClosed { tab_id } => {
                if let Some(tab_id) = self.valid_tab(tab_id) {
                    self.tracker.tab_closed(tab_id)?;
                }
            }

            InboundMessage::TabReplaced {
                old_tab_id,
                new_tab_id,
            } => {
                if let (Some(old_tab_id), Some(new_tab_id)) =
                    (self.valid_tab(old_tab_id), self.valid_tab(new_tab_id))
                {
                    self.tracker.tab_replaced(old_tab_id, new_tab_id)?;
                }
            }

            InboundMessage::Ping => return Ok(Some(OutboundMessage::Ready)),
        }

        Ok(None)
    }

    /// Converts a wire tab id, logging rejects.
    fn valid_tab(&self, raw: i64) -> Option<TabId> {
        let tab_id = TabId::from_raw(raw);
        if tab_id.is_none() {
            debug!(channel_id = %self.channel_id, tab_id = raw, "Ignoring invalid tab id");
        }
        tab_id
    }

    /// Writes a snapshot update to the socket.
    async fn send_update(&self, ws_write: &mut WsSink, update: &Arc<SnapshotUpdate>) -> Result<()> {
        let message = OutboundMessage::from(SnapshotUpdate::clone(update));
        Self::send_message(ws_write, &message).await?;

        trace!(channel_id = %self.channel_id, tab_id = %update.tab_id, "Snapshot pushed");
        Ok(())
    }

    /// Serializes and writes one message.
    async fn send_message(ws_write: &mut WsSink, message: &OutboundMessage) -> Result<()> {
        let json = message.to_json()?;
        ws_write.send(Message::Text(json.into())).await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
