//! Time-expiring in-memory cache.
//!
//! This module provides the memoization store used by the API client:
//! - Entries carry an absolute expiry computed from a per-entry TTL
//! - Expired entries are never served; reading one evicts it
//! - `clear_expired` sweeps stale entries independently of reads
//! - Time comes from a [`Clock`] so expiry can be driven deterministically

mod clock;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{CacheEntry, CacheStats, TtlCache};
