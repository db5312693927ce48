//! Cache entry metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fraction of the TTL after which an entry is reported as stale.
pub const STALE_RATIO: f64 = 0.8;

/// A single cached value with its write time and lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
  /// The cached value, opaque to the store
  pub data: Value,
  /// Write time in epoch milliseconds
  pub timestamp: i64,
  /// Lifetime in milliseconds
  pub ttl: u64,
  /// Caller-supplied tag, never interpreted by the store
  pub version: Option<String>,
}

impl CacheEntry {
  pub fn new(data: Value, timestamp: i64, ttl: u64, version: Option<String>) -> Self {
    Self {
      data,
      timestamp,
      ttl,
      version,
    }
  }

  /// Milliseconds elapsed since the entry was written.
  pub fn age(&self, now_ms: i64) -> i64 {
    now_ms - self.timestamp
  }

  /// An entry is expired once its age strictly exceeds its TTL.
  pub fn is_expired(&self, now_ms: i64) -> bool {
    self.age(now_ms) > ttl_as_i64(self.ttl)
  }

  /// Advisory flag: more than 80% of the TTL has elapsed.
  pub fn is_stale(&self, now_ms: i64) -> bool {
    self.age(now_ms) as f64 > self.ttl as f64 * STALE_RATIO
  }

  /// Epoch millisecond after which the entry counts as expired.
  pub(crate) fn expires_at(&self) -> i64 {
    self.timestamp.saturating_add(ttl_as_i64(self.ttl))
  }
}

fn ttl_as_i64(ttl: u64) -> i64 {
  i64::try_from(ttl).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_expiry_is_strict() {
    let entry = CacheEntry::new(json!(1), 1_000, 500, None);
    assert!(!entry.is_expired(1_500));
    assert!(entry.is_expired(1_501));
  }

  #[test]
  fn test_stale_after_eighty_percent() {
    let entry = CacheEntry::new(json!("x"), 0, 1_000, None);
    assert!(!entry.is_stale(800));
    assert!(entry.is_stale(801));
    assert!(!entry.is_expired(801));
  }

  #[test]
  fn test_huge_ttl_does_not_overflow() {
    let entry = CacheEntry::new(json!(null), 10, u64::MAX, None);
    assert!(!entry.is_expired(i64::MAX));
    assert_eq!(entry.expires_at(), i64::MAX);
  }
}
