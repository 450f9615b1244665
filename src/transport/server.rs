//! WebSocket server hosting a [`Tracker`].
//!
//! Every accepted socket becomes a [`PeerConnection`] running on its own
//! task. All peers share the same tracker, so observers on one socket see
//! requests reported on another.
//!
//! # Example
//!
//! ```ignore
//! let server = TrackerServer::start(TrackerConfig::default()).await?;
//! println!("WebSocket URL: {}", server.ws_url());
//!
//! // ... serve until asked to stop
//! server.shutdown();
//! server.tracker().shutdown();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::AbortHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::TrackerConfig;
use crate::error::{Error, Result};
use crate::identifiers::ChannelId;
use crate::tracker::Tracker;

use super::PeerConnection;

// ============================================================================
// Constants
// ============================================================================

/// How often the accept loop rechecks the shutdown flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// TrackerServer
// ============================================================================

/// Accepts WebSocket peers and wires them to a tracker.
pub struct TrackerServer {
    /// Address the listener is bound to.
    local_addr: SocketAddr,

    /// Shared tracker.
    tracker: Tracker,

    /// Running peer tasks by channel id.
    peers: Mutex<FxHashMap<ChannelId, AbortHandle>>,

    /// Shutdown flag.
    shutdown: AtomicBool,
}

// ============================================================================
// TrackerServer - Constructor
// ============================================================================

impl TrackerServer {
    /// Spawns a tracker from `config` and serves it.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the configuration is invalid
    /// - [`Error::Io`] if binding fails
    pub async fn start(config: TrackerConfig) -> Result<Arc<Self>> {
        let tracker = Tracker::spawn(config.clone())?;
        Self::bind(&config, tracker).await
    }

    /// Binds to `config.bind_addr` and starts the accept loop for `tracker`.
    ///
    /// Use port 0 to let the OS pick a free port.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the configuration is invalid
    /// - [`Error::Io`] if binding fails
    pub async fn bind(config: &TrackerConfig, tracker: Tracker) -> Result<Arc<Self>> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        let server = Arc::new(Self {
            local_addr,
            tracker,
            peers: Mutex::new(FxHashMap::default()),
            shutdown: AtomicBool::new(false),
        });

        let server_clone = Arc::clone(&server);
        tokio::spawn(async move {
            server_clone.accept_loop(listener).await;
        });

        info!(%local_addr, "TrackerServer started");

        Ok(server)
    }
}

// ============================================================================
// TrackerServer - Public API
// ============================================================================

impl TrackerServer {
    /// Returns the bound address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Returns the WebSocket URL peers connect to.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// Returns the served tracker.
    #[inline]
    #[must_use]
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Returns the number of connected peers.
    #[inline]
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) was called.
    #[inline]
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Stops accepting and disconnects every peer.
    ///
    /// The tracker keeps running; its observer channels for these peers are
    /// released.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(local_addr = %self.local_addr, "TrackerServer shutting down");

        let peers: Vec<_> = self.peers.lock().drain().collect();
        for (channel_id, handle) in peers {
            handle.abort();
            let _ = self.tracker.channel_closed(channel_id);
            debug!(%channel_id, "Peer closed during shutdown");
        }
    }
}

// ============================================================================
// TrackerServer - Accept Loop
// ============================================================================

impl TrackerServer {
    /// Background task that accepts new connections.
    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        debug!("Accept loop started");

        loop {
            if self.is_shutdown() {
                debug!("Accept loop shutting down");
                break;
            }

            // Accept with timeout to allow checking shutdown flag
            match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream, addr).await {
                            warn!(error = %e, ?addr, "Connection handling failed");
                        }
                    });
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Accept failed");
                }
                Err(_) => continue,
            }
        }

        debug!("Accept loop terminated");
    }

    /// Upgrades one TCP connection and runs its peer loop.
    async fn handle_connection(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!(?addr, "New TCP connection");

        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        let peer = PeerConnection::new(addr, self.tracker.clone());
        let channel_id = peer.channel_id();

        {
            // Held across the spawn so the task cannot deregister before it is registered
            let mut peers = self.peers.lock();
            if self.is_shutdown() {
                return Err(Error::ConnectionClosed);
            }

            let server = Arc::clone(&self);
            let handle = tokio::spawn(async move {
                peer.run(ws_stream).await;
                server.peers.lock().remove(&channel_id);
            });
            peers.insert(channel_id, handle.abort_handle());
        }

        info!(%channel_id, ?addr, "Peer connected");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

    use crate::identifiers::TabId;
    use crate::protocol::OutboundMessage;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    fn config() -> TrackerConfig {
        TrackerConfig::new().with_throttle(Duration::from_millis(20))
    }

    async fn connect(server: &TrackerServer) -> Client {
        let (client, _) = connect_async(server.ws_url()).await.expect("connect");
        client
    }

    async fn send(client: &mut Client, text: &str) {
        client
            .send(Message::Text(text.to_owned().into()))
            .await
            .expect("send");
    }

    async fn recv(client: &mut Client) -> OutboundMessage {
        loop {
            let frame = timeout(RECV_TIMEOUT, client.next())
                .await
                .expect("frame within timeout")
                .expect("stream open")
                .expect("frame ok");

            if let Message::Text(text) = frame {
                return serde_json::from_str(&text).expect("outbound json");
            }
        }
    }

    async fn wait_for(mut condition: impl AsyncFnMut() -> bool) {
        for _ in 0..100 {
            if condition().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not met in time");
    }

    #[tokio::test]
    async fn test_server_binds_random_port() {
        let server = TrackerServer::start(config()).await.expect("start");
        assert!(server.port() > 0);
        assert_eq!(server.ws_url(), format!("ws://127.0.0.1:{}", server.port()));
        assert_eq!(server.peer_count(), 0);
        server.shutdown();
        assert!(server.is_shutdown());
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let result = TrackerServer::start(config().with_throttle(Duration::ZERO)).await;
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_ping_ready() -> anyhow::Result<()> {
        let server = TrackerServer::start(config()).await?;
        let (mut client, _) = connect_async(server.ws_url()).await?;

        client.send(Message::Text(r#"{"type":"PING"}"#.into())).await?;
        assert_eq!(recv(&mut client).await, OutboundMessage::Ready);

        server.shutdown();
        Ok(())
    }

    #[tokio::test]
    async fn test_subscribe_then_throttled_update() {
        let server = TrackerServer::start(config()).await.expect("start");
        let mut popup = connect(&server).await;
        let mut capture = connect(&server).await;

        send(&mut popup, r#"{"type":"SUBSCRIBE_TAB","tabId":3}"#).await;
        let OutboundMessage::TabDomainsUpdate(initial) = recv(&mut popup).await else {
            panic!("expected snapshot");
        };
        assert_eq!(initial.tab_id, TabId::new(3));
        assert!(initial.domains.is_empty());

        for url in [
            "https://www.example.com/",
            "https://cdn.example.com/a.js",
            "https://tracker.net/p",
        ] {
            let frame = format!(r#"{{"type":"REQUEST_OBSERVED","tabId":3,"url":"{url}"}}"#);
            send(&mut capture, &frame).await;
        }

        // Wait until all three landed before reading the coalesced push
        let tracker = server.tracker().clone();
        wait_for(async || {
            tracker
                .snapshot(TabId::new(3))
                .await
                .is_ok_and(|s| s.total() == 3)
        })
        .await;

        let domains = loop {
            let OutboundMessage::TabDomainsUpdate(update) = recv(&mut popup).await else {
                panic!("expected snapshot");
            };
            if update.domains.total() == 3 {
                break update.domains;
            }
        };
        assert_eq!(domains.count_of("example.com"), Some(2));
        assert_eq!(domains.count_of("tracker.net"), Some(1));
        assert_eq!(domains.entries()[0].domain, "example.com");

        server.shutdown();
    }

    #[tokio::test]
    async fn test_garbage_frame_keeps_connection() {
        let server = TrackerServer::start(config()).await.expect("start");
        let mut client = connect(&server).await;

        send(&mut client, "not json").await;
        send(&mut client, r#"{"type":"NOPE"}"#).await;
        send(&mut client, r#"{"type":"PING"}"#).await;
        assert_eq!(recv(&mut client).await, OutboundMessage::Ready);

        server.shutdown();
    }

    #[tokio::test]
    async fn test_disconnect_releases_channel() {
        let server = TrackerServer::start(config()).await.expect("start");
        let mut client = connect(&server).await;

        send(&mut client, r#"{"type":"SUBSCRIBE_TAB","tabId":9}"#).await;
        let _ = recv(&mut client).await;
        assert_eq!(server.tracker().stats().await.expect("stats").channels, 1);

        client.close(None).await.expect("close");
        drop(client);

        let tracker = server.tracker().clone();
        wait_for(async || tracker.stats().await.is_ok_and(|s| s.channels == 0)).await;
        wait_for(async || server.peer_count() == 0).await;

        server.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_releases_peers() {
        let server = TrackerServer::start(config()).await.expect("start");
        let mut client = connect(&server).await;

        send(&mut client, r#"{"type":"SUBSCRIBE_TAB","tabId":2}"#).await;
        let _ = recv(&mut client).await;
        wait_for(async || server.peer_count() == 1).await;

        server.shutdown();
        assert_eq!(server.peer_count(), 0);

        let tracker = server.tracker().clone();
        wait_for(async || tracker.stats().await.is_ok_and(|s| s.channels == 0)).await;
        assert!(tracker.is_running());
    }
}
