//! In-memory TTL store.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::clock::{Clock, SystemClock};

/// A single cached value with its lifetime bounds.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
  pub value: V,
  /// When the entry was written
  pub inserted_at: DateTime<Utc>,
  /// First instant at which the entry is no longer served
  pub expires_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
  fn is_expired(&self, now: DateTime<Utc>) -> bool {
    now >= self.expires_at
  }
}

/// Diagnostics snapshot returned by [`TtlCache::stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
  pub size: usize,
  pub keys: Vec<String>,
}

/// Key/value store whose entries expire after a per-entry TTL.
///
/// There is no capacity bound and no LRU eviction: entries leave the store
/// only when they expire (on read or on [`TtlCache::clear_expired`]) or when
/// the store is cleared.
pub struct TtlCache<V> {
  entries: Mutex<BTreeMap<String, CacheEntry<V>>>,
  clock: Arc<dyn Clock>,
}

impl<V: Clone> TtlCache<V> {
  pub fn new() -> Self {
    Self::with_clock(Arc::new(SystemClock))
  }

  pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
    Self {
      entries: Mutex::new(BTreeMap::new()),
      clock,
    }
  }

  /// Return the value stored under `key` if it has not expired.
  ///
  /// An expired entry is removed before reporting the miss.
  pub fn get(&self, key: &str) -> Option<V> {
    let now = self.clock.now();
    let mut entries = self.entries.lock();

    match entries.get(key) {
      Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
      Some(_) => {
        entries.remove(key);
        None
      }
      None => None,
    }
  }

  /// Store `value` under `key`, replacing any previous entry.
  pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
    let now = self.clock.now();
    let entry = CacheEntry {
      value,
      inserted_at: now,
      expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
    };
    self.entries.lock().insert(key.into(), entry);
  }

  /// Look up the full entry, including timestamps, without evicting.
  pub fn entry(&self, key: &str) -> Option<CacheEntry<V>> {
    self.entries.lock().get(key).cloned()
  }

  pub fn clear(&self) {
    self.entries.lock().clear();
  }

  /// Remove every expired entry. Returns how many were dropped.
  pub fn clear_expired(&self) -> usize {
    let now = self.clock.now();
    let mut entries = self.entries.lock();
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    before - entries.len()
  }

  pub fn stats(&self) -> CacheStats {
    let entries = self.entries.lock();
    CacheStats {
      size: entries.len(),
      keys: entries.keys().cloned().collect(),
    }
  }

  pub fn len(&self) -> usize {
    self.entries.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.lock().is_empty()
  }
}

impl<V: Clone> Default for TtlCache<V> {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::ManualClock;

  fn cache_with_clock() -> (TtlCache<String>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let cache = TtlCache::with_clock(clock.clone());
    (cache, clock)
  }

  #[test]
  fn test_get_before_expiry_returns_value() {
    let (cache, clock) = cache_with_clock();
    cache.set("k", "v".to_string(), Duration::seconds(5));

    clock.advance(Duration::milliseconds(4999));
    assert_eq!(cache.get("k").as_deref(), Some("v"));
  }

  #[test]
  fn test_get_at_or_after_expiry_misses_and_evicts() {
    let (cache, clock) = cache_with_clock();
    cache.set("k", "v".to_string(), Duration::seconds(5));

    clock.advance(Duration::seconds(5));
    assert_eq!(cache.get("k"), None);
    assert!(cache.entry("k").is_none());
    assert!(cache.is_empty());
  }

  #[test]
  fn test_set_overwrites_and_resets_expiry() {
    let (cache, clock) = cache_with_clock();
    cache.set("k", "old".to_string(), Duration::seconds(1));
    clock.advance(Duration::milliseconds(900));
    cache.set("k", "new".to_string(), Duration::seconds(1));
    clock.advance(Duration::milliseconds(900));

    assert_eq!(cache.get("k").as_deref(), Some("new"));
    assert_eq!(cache.len(), 1);
  }

  #[test]
  fn test_clear_expired_leaves_live_entries() {
    let (cache, clock) = cache_with_clock();
    cache.set("short", "a".to_string(), Duration::seconds(1));
    cache.set("long", "b".to_string(), Duration::seconds(60));

    clock.advance(Duration::seconds(2));
    assert_eq!(cache.clear_expired(), 1);

    let stats = cache.stats();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.keys, vec!["long".to_string()]);
  }

  #[test]
  fn test_clear_removes_everything() {
    let (cache, _clock) = cache_with_clock();
    cache.set("a", "1".to_string(), Duration::seconds(10));
    cache.set("b", "2".to_string(), Duration::seconds(10));

    cache.clear();
    assert_eq!(cache.stats(), CacheStats { size: 0, keys: vec![] });
  }

  #[test]
  fn test_entry_records_timestamps() {
    let (cache, clock) = cache_with_clock();
    let start = clock.now();
    cache.set("k", "v".to_string(), Duration::minutes(5));

    let entry = cache.entry("k").unwrap();
    assert_eq!(entry.inserted_at, start);
    assert_eq!(entry.expires_at, start + Duration::minutes(5));
  }
}
