//! Root-domain extraction.
//!
//! Maps request URLs to the registrable ("root") domain used as the
//! aggregation key, or to [`UNKNOWN_DOMAIN`] when no domain applies.
//!
//! # Heuristic
//!
//! There is no public-suffix list. A hostname with more than two labels keeps
//! its last three labels when both of the final two are at most three
//! characters long (`example.co.uk`), and its last two otherwise
//! (`example.com`). Short registrable names under short TLDs therefore keep a
//! third label (`www.abc.com` stays `www.abc.com`). This approximation is
//! intentional and must not be "fixed" into a suffix lookup.
//!
//! | URL | Root domain |
//! |-----|-------------|
//! | `https://www.example.com/path` | `example.com` |
//! | `https://a.b.c.example.co.uk` | `example.co.uk` |
//! | `https://sub.example.io` | `example.io` |
//! | `http://192.168.0.1/` | `unknown` |
//! | `http://[::1]/` | `unknown` |
//! | `not a url` | `unknown` |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;
use url::{Host, Url};

use crate::config::DEFAULT_CACHE_CAPACITY;

// ============================================================================
// Constants
// ============================================================================

/// Sentinel returned by [`DomainNormalizer::normalize`] when no root domain
/// can be derived.
pub const UNKNOWN_DOMAIN: &str = "unknown";

/// Labels this short (in characters) count as part of a compound suffix.
const SHORT_LABEL_MAX: usize = 3;

// ============================================================================
// DomainNormalizer
// ============================================================================

/// URL to root-domain normalizer with a hostname cache.
///
/// The cache is cleared wholesale once it reaches capacity; it is a growth
/// guard, not an LRU.
///
/// # Thread Safety
///
/// `DomainNormalizer` is `Send + Sync`; the cache sits behind a mutex.
pub struct DomainNormalizer {
    /// Hostname to root domain.
    cache: Mutex<FxHashMap<Box<str>, Arc<str>>>,
    /// Maximum cached hostnames.
    capacity: usize,
}

impl Default for DomainNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainNormalizer {
    /// Creates a normalizer with the default cache capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Creates a normalizer with a custom cache capacity.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(FxHashMap::default()),
            capacity: capacity.max(1),
        }
    }

    /// Returns the root domain for `url`, or [`UNKNOWN_DOMAIN`].
    ///
    /// Total: never panics, whatever the input.
    #[must_use]
    pub fn normalize(&self, url: &str) -> String {
        self.root_domain(url)
            .map_or_else(|| UNKNOWN_DOMAIN.to_string(), |domain| domain.to_string())
    }

    /// Returns the root domain for `url`, or `None` where
    /// [`normalize`](Self::normalize) would return the sentinel.
    ///
    /// Unlike the sentinel form, this cannot confuse a host literally named
    /// `unknown` with a failure.
    #[must_use]
    pub fn root_domain(&self, url: &str) -> Option<Arc<str>> {
        let hostname = extract_hostname(url)?;

        let mut cache = self.cache.lock();
        if let Some(hit) = cache.get(hostname.as_str()) {
            return Some(Arc::clone(hit));
        }

        let root: Arc<str> = Arc::from(registrable_suffix(&hostname));
        if cache.len() >= self.capacity {
            trace!(entries = cache.len(), "Domain cache full, clearing");
            cache.clear();
        }
        cache.insert(hostname.into_boxed_str(), Arc::clone(&root));

        Some(root)
    }

    /// Returns the number of cached hostnames.
    #[inline]
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}

// ============================================================================
// Hostname Helpers
// ============================================================================

/// Parses `url` and returns its lower-cased hostname, rejecting IP literals.
fn extract_hostname(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;

    let host = match parsed.host()? {
        Host::Ipv4(_) | Host::Ipv6(_) => return None,
        Host::Domain(domain) => domain,
    };

    // Non-special schemes keep opaque hosts as written
    let hostname = host.trim_end_matches('.').to_ascii_lowercase();

    if hostname.is_empty() || is_ipv4_literal(&hostname) || is_ipv6_literal(&hostname) {
        return None;
    }

    Some(hostname)
}

/// Four dot-separated decimal octets, each 0–255.
fn is_ipv4_literal(host: &str) -> bool {
    let mut octets = 0;
    for part in host.split('.') {
        octets += 1;
        let valid = !part.is_empty()
            && part.len() <= 3
            && part.bytes().all(|b| b.is_ascii_digit())
            && part.parse::<u16>().is_ok_and(|n| n <= 255);
        if !valid || octets > 4 {
            return false;
        }
    }
    octets == 4
}

/// Hex digits and colons only, with at least one colon. Brackets allowed.
fn is_ipv6_literal(host: &str) -> bool {
    let inner = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    inner.contains(':') && inner.chars().all(|c| c == ':' || c.is_ascii_hexdigit())
}

/// Applies the compound-suffix heuristic to a hostname.
///
/// Returns a suffix slice of `hostname`.
#[must_use]
pub fn registrable_suffix(hostname: &str) -> &str {
    let labels: Vec<&str> = hostname.split('.').collect();
    let count = labels.len();

    if count <= 2 {
        return hostname;
    }

    let last = labels[count - 1];
    let second_last = labels[count - 2];

    let keep = if is_short_label(last) && is_short_label(second_last) {
        3
    } else {
        2
    };

    let suffix_len = labels[count - keep..]
        .iter()
        .map(|label| label.len())
        .sum::<usize>()
        + (keep - 1);

    &hostname[hostname.len() - suffix_len..]
}

#[inline]
fn is_short_label(label: &str) -> bool {
    label.chars().count() <= SHORT_LABEL_MAX
}

// ============================================================================
// Tests
// ============================================================================
