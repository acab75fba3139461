//! Freshness policy for cache reads
//!
//! Expiry is evaluated lazily at read time; entries are never deleted just
//! because they expired. An expired entry downgrades to a stale fallback,
//! served only when nothing fresher can be fetched.

use outpost_domain::{CacheEntry, CacheLookup};

/// Freshness of a cache entry at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

/// Evaluate an entry against the wall clock.
pub fn evaluate(entry: &CacheEntry, now_ms: i64) -> Freshness {
    if entry.is_fresh_at(now_ms) {
        Freshness::Fresh
    } else {
        Freshness::Stale
    }
}

/// Turn an entry into a lookup result tagged with staleness.
pub fn to_lookup(entry: &CacheEntry, now_ms: i64) -> CacheLookup {
    CacheLookup {
        value: entry.value.clone(),
        stale: evaluate(entry, now_ms) == Freshness::Stale,
    }
}
