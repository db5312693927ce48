//! Periodic cache statistics for diagnostics views.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::DataCache;

/// How often [`StatsMonitor`] samples by default.
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Shortest sampling interval; smaller values are raised to it.
const MIN_STATS_INTERVAL: Duration = Duration::from_millis(1);

/// Point-in-time snapshot of the shared cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
  pub size: usize,
  pub max_size: usize,
  pub pending_changes: usize,
  pub is_online: bool,
}

/// Polls [`DataCache::stats`] on an interval. Read-only; stops when dropped.
pub struct StatsMonitor {
  rx: watch::Receiver<CacheStats>,
  task: JoinHandle<()>,
}

impl StatsMonitor {
  /// Start polling. Must be called from within a tokio runtime.
  pub fn spawn(cache: &Arc<DataCache>, interval: Duration) -> Self {
    let (tx, rx) = watch::channel(cache.stats());
    let weak = Arc::downgrade(cache);

    let task = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval.max(MIN_STATS_INTERVAL));
      loop {
        ticker.tick().await;
        let Some(cache) = weak.upgrade() else {
          break;
        };
        let stats = cache.stats();
        tx.send_if_modified(|current| {
          if *current == stats {
            false
          } else {
            *current = stats;
            true
          }
        });
      }
    });

    Self { rx, task }
  }

  /// Latest sampled stats.
  pub fn current(&self) -> CacheStats {
    *self.rx.borrow()
  }

  /// Wait until a sample differs from the last one seen.
  pub async fn changed(&mut self) -> Option<CacheStats> {
    self.rx.changed().await.ok()?;
    Some(*self.rx.borrow_and_update())
  }
}

impl Drop for StatsMonitor {
  fn drop(&mut self) {
    self.task.abort();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheOptions;
  use crate::offline::{ChangeAction, PendingChange};
  use crate::SetOptions;
  use serde_json::json;

  #[tokio::test]
  async fn test_monitor_tracks_cache() {
    let cache = DataCache::new(CacheOptions::default());
    let mut monitor = StatsMonitor::spawn(&cache, Duration::from_millis(5));
    assert_eq!(monitor.current().size, 0);
    assert_eq!(monitor.current().max_size, 100);

    cache.store().set("orgs", json!([]), SetOptions::default());
    cache.add_pending_change(PendingChange::new(ChangeAction::Create, json!({}), 1));

    let stats = tokio::time::timeout(Duration::from_secs(1), async {
      loop {
        let stats = monitor.changed().await.unwrap();
        if stats.size == 1 && stats.pending_changes == 1 {
          break stats;
        }
      }
    })
    .await
    .unwrap();
    assert!(stats.is_online);
  }

  #[tokio::test]
  async fn test_zero_interval_still_samples() {
    let cache = DataCache::new(CacheOptions::default());
    let mut monitor = StatsMonitor::spawn(&cache, Duration::ZERO);

    cache.store().set("orgs", json!([]), SetOptions::default());
    let stats = tokio::time::timeout(Duration::from_secs(1), monitor.changed())
      .await
      .unwrap()
      .unwrap();
    assert_eq!(stats.size, 1);
  }

  #[test]
  fn test_stats_serialize_camel_case() {
    let stats = CacheStats {
      size: 1,
      max_size: 2,
      pending_changes: 3,
      is_online: true,
    };
    assert_eq!(
      serde_json::to_value(stats).unwrap(),
      json!({ "size": 1, "maxSize": 2, "pendingChanges": 3, "isOnline": true })
    );
  }
}
