//! In-process tracking of a simulated tab.
//!
//! Demonstrates:
//! - Spawning a tracker
//! - Subscribing an observer channel to a tab
//! - Reporting sub-resource requests and a navigation reset
//! - Throttled snapshot delivery
//!
//! Usage:
//!   cargo run --example 001_simulated_tab
//!   cargo run --example 001_simulated_tab -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use common::Args;
use domain_tally::identifiers::ChannelId;
use domain_tally::tracker::snapshot_channel;
use domain_tally::{RequestObserved, Result, TabId, Tracker, TrackerConfig};
use tokio::time::timeout;

// ============================================================================
// Constants
// ============================================================================

const TAB: u64 = 42;

const PAGE_ONE: &[&str] = &[
    "https://www.example.com/",
    "https://static.example.com/app.css",
    "https://static.example.com/app.js",
    "https://fonts.gstatic.com/s/roboto.woff2",
    "https://www.google-analytics.com/collect",
    "https://cdn.shop.co.uk/banner.png",
];

const PAGE_TWO: &[&str] = &[
    "https://news.ycombinator.com/",
    "https://news.ycombinator.com/news.css",
    "http://192.168.1.10/local.png",
];

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

async fn run(_args: Args) -> Result<()> {
    println!("=== 001: Simulated Tab ===\n");

    // ========================================================================
    // Spawn Tracker
    // ========================================================================

    println!("[1] Spawning tracker...");

    let config = TrackerConfig::new().with_throttle(Duration::from_millis(250));
    let tracker = Tracker::spawn(config)?;

    println!("    ✓ Tracker running\n");

    // ========================================================================
    // Subscribe
    // ========================================================================

    println!("[2] Subscribing to tab {TAB}...");

    let (sink, mut updates) = snapshot_channel();
    tracker.subscribe(ChannelId::next(), TabId::new(TAB), sink)?;

    if let Some(update) = updates.recv().await {
        println!("    ✓ Initial snapshot");
        common::print_snapshot(&update.domains);
    }
    println!();

    // ========================================================================
    // First Page
    // ========================================================================

    println!("[3] Loading first page ({} requests)...", PAGE_ONE.len());

    load_page(&tracker, PAGE_ONE)?;
    drain_latest(&mut updates).await;

    // ========================================================================
    // Navigation
    // ========================================================================

    println!("[4] Navigating ({} requests)...", PAGE_TWO.len());

    load_page(&tracker, PAGE_TWO)?;
    drain_latest(&mut updates).await;

    // ========================================================================
    // Stats & Shutdown
    // ========================================================================

    let stats = tracker.stats().await?;
    println!("[5] Stats: {stats:?}\n");

    tracker.tab_closed(TabId::new(TAB))?;
    tracker.shutdown();
    tracker.closed().await;

    println!("=== Done ===");
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Reports a page load: the first URL is the main frame.
fn load_page(tracker: &Tracker, urls: &[&str]) -> Result<()> {
    for (i, url) in urls.iter().enumerate() {
        let event = if i == 0 {
            RequestObserved::main_frame(TAB as i64, *url)
        } else {
            RequestObserved::new(TAB as i64, *url)
        };
        tracker.observe(event)?;
    }
    Ok(())
}

/// Prints every update that arrives within one second.
async fn drain_latest(updates: &mut domain_tally::tracker::SnapshotStream) {
    let mut received = 0;
    while let Ok(Some(update)) = timeout(Duration::from_secs(1), updates.recv()).await {
        received += 1;
        println!("    ✓ Update #{received} ({} requests)", update.domains.total());
        common::print_snapshot(&update.domains);
    }
    println!();
}
