//! Replay of pending changes with per-change exponential backoff.

use color_eyre::Result;
use futures::future::{join_all, BoxFuture};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::connectivity::Connectivity;
use super::pending::{FailureOutcome, PendingChange, PendingQueue};

/// A boxed future returned by a [`ChangeSyncer`].
pub type SyncFuture = BoxFuture<'static, Result<()>>;

/// Transport that applies one pending change to the server.
///
/// Implemented for any `Fn(PendingChange) -> impl Future<Output = Result<()>>`.
pub trait ChangeSyncer: Send + Sync {
  fn sync(&self, change: PendingChange) -> SyncFuture;
}

impl<F, Fut> ChangeSyncer for F
where
  F: Fn(PendingChange) -> Fut + Send + Sync,
  Fut: Future<Output = Result<()>> + Send + 'static,
{
  fn sync(&self, change: PendingChange) -> SyncFuture {
    Box::pin(self(change))
  }
}

/// Notifications published while draining the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
  /// The change was applied and removed from the queue
  Synced { id: String },
  /// The change failed and will be retried after `delay`
  Retrying {
    id: String,
    retry_count: u32,
    delay: Duration,
  },
  /// The change exhausted its retry budget and was removed without being applied
  Dropped { change: PendingChange, error: String },
}

/// Retry budget and backoff base for pending change replay.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub max_retries: u32,
  pub base_delay: Duration,
}

impl RetryPolicy {
  /// Delay before the attempt following the `retry_count`-th failure.
  pub fn delay_for(&self, retry_count: u32) -> Duration {
    self
      .base_delay
      .saturating_mul(2u32.saturating_pow(retry_count))
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 3,
      base_delay: Duration::from_secs(1),
    }
  }
}

/// Counts from one drain of the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
  pub synced: usize,
  pub dropped: usize,
  /// Still queued: went offline mid-retry, removed elsewhere, or no syncer
  pub deferred: usize,
}

enum ChangeOutcome {
  Synced,
  Dropped,
  Deferred,
}

/// Drives [`ChangeSyncer`] calls for the queued changes.
pub(crate) struct SyncDriver {
  queue: Arc<PendingQueue>,
  connectivity: Connectivity,
  syncer: Option<Arc<dyn ChangeSyncer>>,
  events: broadcast::Sender<SyncEvent>,
  policy: RetryPolicy,
}

/// Clears the in-flight mark even if the sync task is aborted.
struct InFlight<'a> {
  queue: &'a PendingQueue,
  id: &'a str,
}

impl Drop for InFlight<'_> {
  fn drop(&mut self) {
    self.queue.finish(self.id);
  }
}

impl SyncDriver {
  pub(crate) fn new(
    queue: Arc<PendingQueue>,
    connectivity: Connectivity,
    syncer: Option<Arc<dyn ChangeSyncer>>,
    events: broadcast::Sender<SyncEvent>,
    policy: RetryPolicy,
  ) -> Self {
    Self {
      queue,
      connectivity,
      syncer,
      events,
      policy,
    }
  }

  /// Attempt every queued change concurrently and wait until each one has
  /// been synced, dropped, or deferred.
  pub(crate) async fn drain(self: &Arc<Self>) -> SyncSummary {
    let Some(syncer) = self.syncer.clone() else {
      debug!(pending = self.queue.len(), "no change syncer configured, leaving queue as is");
      return SyncSummary {
        deferred: self.queue.len(),
        ..SyncSummary::default()
      };
    };

    let ids: Vec<String> = self
      .queue
      .list()
      .into_iter()
      .map(|change| change.id)
      .filter(|id| self.queue.try_begin(id))
      .collect();
    if ids.is_empty() {
      return SyncSummary::default();
    }
    info!(count = ids.len(), "syncing pending changes");

    let tasks = ids.into_iter().map(|id| {
      let driver = Arc::clone(self);
      let syncer = Arc::clone(&syncer);
      tokio::spawn(async move {
        let _guard = InFlight {
          queue: &driver.queue,
          id: &id,
        };
        driver.run_change(syncer.as_ref(), &id).await
      })
    });

    let mut summary = SyncSummary::default();
    for result in join_all(tasks).await {
      match result {
        Ok(ChangeOutcome::Synced) => summary.synced += 1,
        Ok(ChangeOutcome::Dropped) => summary.dropped += 1,
        Ok(ChangeOutcome::Deferred) | Err(_) => summary.deferred += 1,
      }
    }
    summary
  }

  async fn run_change(&self, syncer: &dyn ChangeSyncer, id: &str) -> ChangeOutcome {
    loop {
      let Some(change) = self.queue.get(id) else {
        return ChangeOutcome::Deferred;
      };

      let error = match syncer.sync(change).await {
        Ok(()) => {
          self.queue.remove(id);
          debug!(id, "pending change synced");
          let _ = self.events.send(SyncEvent::Synced { id: id.to_string() });
          return ChangeOutcome::Synced;
        }
        Err(e) => e,
      };

      match self.queue.record_failure(id, self.policy.max_retries) {
        None => return ChangeOutcome::Deferred,
        Some(FailureOutcome::Dropped(change)) => {
          warn!(id, retries = change.retry_count, error = %error, "dropping pending change");
          let _ = self.events.send(SyncEvent::Dropped {
            change,
            error: error.to_string(),
          });
          return ChangeOutcome::Dropped;
        }
        Some(FailureOutcome::Retry(retry_count)) => {
          let delay = self.policy.delay_for(retry_count);
          debug!(id, retry_count, ?delay, error = %error, "pending change sync failed, retrying");
          let _ = self.events.send(SyncEvent::Retrying {
            id: id.to_string(),
            retry_count,
            delay,
          });
          tokio::time::sleep(delay).await;
          if !self.connectivity.is_online() {
            debug!(id, "went offline before retry, keeping change queued");
            return ChangeOutcome::Deferred;
          }
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::offline::pending::ChangeAction;
  use color_eyre::eyre::eyre;
  use serde_json::json;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Mutex;

  fn driver(
    queue: Arc<PendingQueue>,
    syncer: Option<Arc<dyn ChangeSyncer>>,
  ) -> (Arc<SyncDriver>, broadcast::Receiver<SyncEvent>, Connectivity) {
    let (tx, rx) = broadcast::channel(16);
    let connectivity = Connectivity::new(true);
    let policy = RetryPolicy {
      max_retries: 3,
      base_delay: Duration::from_millis(1),
    };
    let driver = SyncDriver::new(queue, connectivity.clone(), syncer, tx, policy);
    (Arc::new(driver), rx, connectivity)
  }

  fn queued(queue: &PendingQueue, n: i64) -> PendingChange {
    let change = PendingChange::new(ChangeAction::Create, json!({ "n": n }), n);
    queue.add(change.clone());
    change
  }

  #[test]
  fn test_backoff_doubles() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.delay_for(1), Duration::from_secs(2));
    assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    assert_eq!(policy.delay_for(0), Duration::from_secs(1));
  }

  #[tokio::test]
  async fn test_successful_sync_removes_changes() {
    let queue = Arc::new(PendingQueue::new(true));
    let a = queued(&queue, 1);
    queued(&queue, 2);

    let syncer: Arc<dyn ChangeSyncer> =
      Arc::new(|_change: PendingChange| async { Ok::<(), color_eyre::Report>(()) });
    let (driver, mut events, _) = driver(queue.clone(), Some(syncer));

    let summary = driver.drain().await;
    assert_eq!(summary.synced, 2);
    assert!(queue.is_empty());

    let mut synced = Vec::new();
    while let Ok(SyncEvent::Synced { id }) = events.try_recv() {
      synced.push(id);
    }
    assert_eq!(synced.len(), 2);
    assert!(synced.contains(&a.id));
  }

  #[tokio::test]
  async fn test_retry_cap_drops_after_three_attempts() {
    let queue = Arc::new(PendingQueue::new(true));
    let change = queued(&queue, 1);

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let syncer: Arc<dyn ChangeSyncer> = Arc::new(move |_change: PendingChange| {
      counter.fetch_add(1, Ordering::SeqCst);
      async { Err::<(), _>(eyre!("server unavailable")) }
    });
    let (driver, mut events, _) = driver(queue.clone(), Some(syncer));

    let summary = driver.drain().await;
    assert_eq!(summary.dropped, 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(queue.is_empty());

    // A later drain must not retry it a fourth time
    driver.drain().await;
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    let mut dropped = None;
    while let Ok(event) = events.try_recv() {
      if let SyncEvent::Dropped { change, error } = event {
        assert_eq!(error, "server unavailable");
        dropped = Some(change);
      }
    }
    let dropped = dropped.expect("dropped event");
    assert_eq!(dropped.id, change.id);
    assert_eq!(dropped.retry_count, 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_retries_wait_exponential_backoff() {
    let queue = Arc::new(PendingQueue::new(true));
    queued(&queue, 1);

    let start = tokio::time::Instant::now();
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let log = attempts.clone();
    let syncer: Arc<dyn ChangeSyncer> = Arc::new(move |_change: PendingChange| {
      log.lock().unwrap().push(start.elapsed());
      async { Err::<(), _>(eyre!("server unavailable")) }
    });
    let (tx, _rx) = broadcast::channel(16);
    let driver = Arc::new(SyncDriver::new(
      queue.clone(),
      Connectivity::new(true),
      Some(syncer),
      tx,
      RetryPolicy::default(),
    ));

    let summary = driver.drain().await;
    assert_eq!(summary.dropped, 1);

    // First attempt immediately, then 1s * 2^1 and 1s * 2^2 after each failure
    let attempts = attempts.lock().unwrap().clone();
    let expected = [0u64, 2, 6].map(Duration::from_secs);
    assert_eq!(attempts.len(), expected.len());
    for (elapsed, want) in attempts.iter().zip(expected) {
      assert!(
        *elapsed >= want && *elapsed < want + Duration::from_millis(50),
        "attempt at {:?}, expected {:?}",
        elapsed,
        want
      );
    }
  }

  #[tokio::test]
  async fn test_retry_then_succeed() {
    let queue = Arc::new(PendingQueue::new(true));
    queued(&queue, 1);

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let syncer: Arc<dyn ChangeSyncer> = Arc::new(move |_change: PendingChange| {
      let attempt = counter.fetch_add(1, Ordering::SeqCst);
      async move {
        if attempt == 0 {
          Err(eyre!("flaky"))
        } else {
          Ok(())
        }
      }
    });
    let (driver, _events, _) = driver(queue.clone(), Some(syncer));

    let summary = driver.drain().await;
    assert_eq!(summary.synced, 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_going_offline_defers_retry() {
    let queue = Arc::new(PendingQueue::new(true));
    let change = queued(&queue, 1);

    let (tx, _rx) = broadcast::channel(16);
    let connectivity = Connectivity::new(true);
    let offline = connectivity.clone();
    let syncer: Arc<dyn ChangeSyncer> = Arc::new(move |_change: PendingChange| {
      offline.set_online(false);
      async { Err::<(), _>(eyre!("network down")) }
    });
    let driver = Arc::new(SyncDriver::new(
      queue.clone(),
      connectivity,
      Some(syncer),
      tx,
      RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(1),
      },
    ));

    let summary = driver.drain().await;
    assert_eq!(summary.deferred, 1);
    let remaining = queue.get(&change.id).unwrap();
    assert_eq!(remaining.retry_count, 1);
  }

  #[tokio::test]
  async fn test_without_syncer_changes_stay_queued() {
    let queue = Arc::new(PendingQueue::new(true));
    queued(&queue, 1);
    let (driver, _events, _) = driver(queue.clone(), None);

    let summary = driver.drain().await;
    assert_eq!(summary.deferred, 1);
    assert_eq!(queue.len(), 1);
  }
}
