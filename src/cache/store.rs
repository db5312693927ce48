//! In-memory TTL store with bounded size.
//!
//! Entries are indexed twice besides the key map: by write order (for
//! max-size eviction) and by expiry time (for the periodic sweep). Both
//! indexes are kept in lock-step with the key map under a single mutex.

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

use super::entry::CacheEntry;
use crate::clock::Clock;

/// Per-write options for [`CacheStore::set`].
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
  /// Overrides the store's default TTL
  pub ttl: Option<Duration>,
  /// Opaque tag stored with the entry
  pub version: Option<String>,
}

impl SetOptions {
  pub fn with_ttl(ttl: Duration) -> Self {
    Self {
      ttl: Some(ttl),
      version: None,
    }
  }
}

struct Slot {
  entry: CacheEntry,
  seq: u64,
}

#[derive(Default)]
struct StoreState {
  entries: HashMap<String, Slot>,
  /// (timestamp, seq) -> key; oldest write first
  by_write: BTreeMap<(i64, u64), String>,
  /// (expires_at, seq) -> key; earliest expiry first
  by_expiry: BTreeMap<(i64, u64), String>,
  next_seq: u64,
}

impl StoreState {
  fn insert(&mut self, key: String, entry: CacheEntry) {
    self.remove(&key);
    let seq = self.next_seq;
    self.next_seq += 1;
    self.by_write.insert((entry.timestamp, seq), key.clone());
    self.by_expiry.insert((entry.expires_at(), seq), key.clone());
    self.entries.insert(key, Slot { entry, seq });
  }

  fn remove(&mut self, key: &str) -> Option<CacheEntry> {
    let slot = self.entries.remove(key)?;
    self.by_write.remove(&(slot.entry.timestamp, slot.seq));
    self.by_expiry.remove(&(slot.entry.expires_at(), slot.seq));
    Some(slot.entry)
  }

  fn evict_to(&mut self, max_size: usize) -> usize {
    let mut evicted = 0;
    while self.entries.len() > max_size {
      let Some((_, key)) = self.by_write.pop_first() else {
        break;
      };
      if let Some(slot) = self.entries.remove(&key) {
        self.by_expiry.remove(&(slot.entry.expires_at(), slot.seq));
        evicted += 1;
      }
    }
    evicted
  }

  /// Look up a live entry, deleting it if it has expired.
  fn live(&mut self, key: &str, now_ms: i64) -> Option<&CacheEntry> {
    let expired = self.entries.get(key)?.entry.is_expired(now_ms);
    if expired {
      self.remove(key);
      trace!(key, "lazily removed expired entry");
      return None;
    }
    self.entries.get(key).map(|slot| &slot.entry)
  }
}

/// Keyed store of JSON values with per-entry expiry and a size cap.
pub struct CacheStore {
  state: Mutex<StoreState>,
  max_size: usize,
  default_ttl: Duration,
  clock: Arc<dyn Clock>,
}

impl CacheStore {
  pub fn new(max_size: usize, default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
    Self {
      state: Mutex::new(StoreState::default()),
      max_size,
      default_ttl,
      clock,
    }
  }

  // Every operation leaves the indexes consistent before releasing the lock,
  // so a poisoned guard still holds valid state.
  fn lock(&self) -> MutexGuard<'_, StoreState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn max_size(&self) -> usize {
    self.max_size
  }

  pub fn default_ttl(&self) -> Duration {
    self.default_ttl
  }

  /// Number of entries currently held, expired or not.
  pub fn len(&self) -> usize {
    self.lock().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Store `data` under `key`, replacing any previous entry.
  pub fn set(&self, key: &str, data: Value, options: SetOptions) {
    let ttl = options.ttl.unwrap_or(self.default_ttl);
    let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    let entry = CacheEntry::new(data, self.clock.now_ms(), ttl_ms, options.version);

    let mut state = self.lock();
    state.insert(key.to_string(), entry);
    let evicted = state.evict_to(self.max_size);
    if evicted > 0 {
      debug!(evicted, max_size = self.max_size, "evicted oldest entries");
    }
  }

  /// Serialize `data` and store it.
  pub fn set_json<T: Serialize>(&self, key: &str, data: &T, options: SetOptions) -> Result<()> {
    let value =
      serde_json::to_value(data).map_err(|e| eyre!("Failed to serialize value for {}: {}", key, e))?;
    self.set(key, value, options);
    Ok(())
  }

  /// Get the value for `key`, or `None` if missing or expired.
  pub fn get(&self, key: &str) -> Option<Value> {
    self.get_entry(key).map(|entry| entry.data)
  }

  /// Get the value for `key` deserialized as `T`.
  pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
    match self.get(key) {
      Some(value) => serde_json::from_value(value)
        .map(Some)
        .map_err(|e| eyre!("Failed to deserialize cached value for {}: {}", key, e)),
      None => Ok(None),
    }
  }

  /// Get the full entry for `key`, or `None` if missing or expired.
  pub fn get_entry(&self, key: &str) -> Option<CacheEntry> {
    let now = self.clock.now_ms();
    self.lock().live(key, now).cloned()
  }

  /// Whether a live entry exists for `key`. Expired entries count as absent.
  pub fn contains_key(&self, key: &str) -> bool {
    let now = self.clock.now_ms();
    self.lock().live(key, now).is_some()
  }

  /// Remove `key`, returning whether it was present.
  pub fn delete(&self, key: &str) -> bool {
    self.lock().remove(key).is_some()
  }

  /// Remove every entry.
  pub fn clear(&self) {
    *self.lock() = StoreState::default();
  }

  /// Remove every expired entry. Returns how many were removed.
  pub fn purge_expired(&self) -> usize {
    let now = self.clock.now_ms();
    let mut state = self.lock();

    let expired: Vec<String> = state
      .by_expiry
      .range(..(now, 0))
      .map(|(_, key)| key.clone())
      .collect();
    for key in &expired {
      state.remove(key);
    }
    expired.len()
  }

  /// Keys in write order, oldest first.
  pub fn keys(&self) -> Vec<String> {
    self.lock().by_write.values().cloned().collect()
  }
}

impl std::fmt::Debug for CacheStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CacheStore")
      .field("len", &self.len())
      .field("max_size", &self.max_size)
      .field("default_ttl", &self.default_ttl)
      .finish_non_exhaustive()
  }
}
