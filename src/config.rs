//! Tracker configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use domain_tally::TrackerConfig;
//!
//! let config = TrackerConfig::new()
//!     .with_throttle(Duration::from_millis(250))
//!     .with_cache_capacity(4096);
//!
//! config.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default coalescing delay between a mutation and its snapshot broadcast.
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(100);

/// Default number of hostnames the normalizer caches before clearing.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Default WebSocket bind address (localhost, random port).
pub const DEFAULT_BIND_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);

// ============================================================================
// TrackerConfig
// ============================================================================

/// Tracker and server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Trailing-edge coalescing delay per tab.
    pub throttle: Duration,

    /// Normalizer cache size limit.
    pub cache_capacity: usize,

    /// Address the WebSocket server binds to.
    pub bind_addr: SocketAddr,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl TrackerConfig {
    /// Creates a configuration with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            throttle: DEFAULT_THROTTLE,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            bind_addr: DEFAULT_BIND_ADDR,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl TrackerConfig {
    /// Sets the coalescing delay.
    #[inline]
    #[must_use]
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// Sets the normalizer cache capacity.
    #[inline]
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Sets the WebSocket bind address.
    #[inline]
    #[must_use]
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Sets only the port of the bind address.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl TrackerConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the throttle or cache capacity is zero.
    pub fn validate(&self) -> Result<()> {
        if self.throttle.is_zero() {
            return Err(Error::config("throttle must be non-zero"));
        }

        if self.cache_capacity == 0 {
            return Err(Error::config("cache capacity must be non-zero"));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
