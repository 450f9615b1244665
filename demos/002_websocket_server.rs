//! WebSocket tracker server.
//!
//! Demonstrates:
//! - Serving a tracker over WebSocket
//! - Frame format for producers and observers
//! - Graceful shutdown on Ctrl+C
//!
//! Usage:
//!   cargo run --example 002_websocket_server
//!   cargo run --example 002_websocket_server -- --port 9400 --debug
//!   cargo run --example 002_websocket_server -- --no-wait

mod common;

// ============================================================================
// Imports
// ============================================================================

use common::Args;
use domain_tally::{Result, TrackerConfig, TrackerServer};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== 002: WebSocket Server ===\n");

    // ========================================================================
    // Start Server
    // ========================================================================

    println!("[1] Starting server...");

    let mut config = TrackerConfig::default();
    if let Some(port) = args.port {
        config = config.with_port(port);
    }

    let server = TrackerServer::start(config).await?;

    println!("    ✓ Listening on {}\n", server.ws_url());

    // ========================================================================
    // Frame Reference
    // ========================================================================

    println!("[2] Send JSON text frames, e.g.:");
    println!(r#"        {{"type":"SUBSCRIBE_TAB","tabId":1}}"#);
    println!(r#"        {{"type":"REQUEST_OBSERVED","tabId":1,"url":"https://www.example.com/","isMainFrame":true}}"#);
    println!(r#"        {{"type":"TAB_REPLACED","oldTabId":1,"newTabId":2}}"#);
    println!(r#"        {{"type":"TAB_CLOSED","tabId":2}}"#);
    println!(r#"        {{"type":"PING"}}"#);
    println!();

    common::wait_for_exit(args.no_wait).await;

    // ========================================================================
    // Shutdown
    // ========================================================================

    let stats = server.tracker().stats().await?;
    println!("\n[3] Final stats: {stats:?}");

    server.shutdown();
    server.tracker().shutdown();
    server.tracker().closed().await;

    println!("=== Done ===");
    Ok(())
}
