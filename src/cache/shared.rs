//! The shared cache instance handed to every consumer.
//!
//! One `DataCache` is meant to live for the whole process and be passed
//! around as `Arc<DataCache>`. It owns the TTL store, the pending change
//! queue and the connectivity flag, and runs two background tasks: the
//! periodic expiry sweep and (with offline mode on) the reconnect watcher
//! that drains the queue when the client comes back online.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::store::CacheStore;
use crate::clock::{Clock, SystemClock};
use crate::offline::{
  ChangeSyncer, Connectivity, PendingChange, PendingQueue, RetryPolicy, SyncDriver, SyncEvent,
  SyncSummary,
};
use crate::stats::CacheStats;

const EVENT_CAPACITY: usize = 64;

/// Construction options for [`DataCache`].
#[derive(Debug, Clone)]
pub struct CacheOptions {
  /// Default lifetime of an entry
  pub ttl: Duration,
  /// Maximum number of entries before the oldest are evicted
  pub max_size: usize,
  /// Record changes while offline
  pub enable_offline: bool,
  /// Drain the pending queue when connectivity returns
  pub sync_on_reconnect: bool,
  /// Failed attempts after which a pending change is dropped
  pub max_retries: u32,
  /// Backoff base; the n-th retry waits `retry_base_delay * 2^n`
  pub retry_base_delay: Duration,
  /// Interval of the expired-entry sweep
  pub cleanup_interval: Duration,
}

impl Default for CacheOptions {
  fn default() -> Self {
    Self {
      ttl: Duration::from_secs(5 * 60),
      max_size: 100,
      enable_offline: true,
      sync_on_reconnect: true,
      max_retries: 3,
      retry_base_delay: Duration::from_secs(1),
      cleanup_interval: Duration::from_secs(60),
    }
  }
}

/// Builder for [`DataCache`] when the defaults for clock, connectivity or
/// syncer need replacing.
pub struct DataCacheBuilder {
  options: CacheOptions,
  clock: Arc<dyn Clock>,
  connectivity: Connectivity,
  syncer: Option<Arc<dyn ChangeSyncer>>,
}

impl DataCacheBuilder {
  pub fn new(options: CacheOptions) -> Self {
    Self {
      options,
      clock: Arc::new(SystemClock),
      connectivity: Connectivity::default(),
      syncer: None,
    }
  }

  pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  /// Share an existing connectivity flag (e.g. one fed by a probe).
  pub fn connectivity(mut self, connectivity: Connectivity) -> Self {
    self.connectivity = connectivity;
    self
  }

  /// Transport used to replay pending changes.
  pub fn syncer<S: ChangeSyncer + 'static>(mut self, syncer: S) -> Self {
    self.syncer = Some(Arc::new(syncer));
    self
  }

  /// Build the cache and start its background tasks.
  ///
  /// Outside a tokio runtime no tasks are started: expired entries are then
  /// only removed lazily and reconnects do not trigger a sync.
  pub fn build(self) -> Arc<DataCache> {
    let options = self.options;
    let queue = Arc::new(PendingQueue::new(options.enable_offline));
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let policy = RetryPolicy {
      max_retries: options.max_retries,
      base_delay: options.retry_base_delay,
    };
    let sync = Arc::new(SyncDriver::new(
      Arc::clone(&queue),
      self.connectivity.clone(),
      self.syncer,
      events.clone(),
      policy,
    ));

    let cache = Arc::new(DataCache {
      store: CacheStore::new(options.max_size, options.ttl, Arc::clone(&self.clock)),
      queue,
      connectivity: self.connectivity,
      clock: self.clock,
      sync,
      events,
      tasks: Mutex::new(Vec::new()),
      options,
    });

    if tokio::runtime::Handle::try_current().is_ok() {
      let mut tasks = Vec::new();
      if cache.options.cleanup_interval.is_zero() {
        warn!("cleanup interval is zero, expired entries are only removed on read");
      } else {
        tasks.push(spawn_sweep(Arc::downgrade(&cache), cache.options.cleanup_interval));
      }
      if cache.options.enable_offline {
        tasks.push(spawn_reconnect_watcher(&cache));
      }
      *cache.tasks.lock().unwrap_or_else(PoisonError::into_inner) = tasks;
    } else {
      warn!("no tokio runtime, cache background tasks disabled");
    }

    cache
  }
}

/// Process-wide cache shared by all consumers.
pub struct DataCache {
  store: CacheStore,
  queue: Arc<PendingQueue>,
  connectivity: Connectivity,
  clock: Arc<dyn Clock>,
  sync: Arc<SyncDriver>,
  events: broadcast::Sender<SyncEvent>,
  tasks: Mutex<Vec<JoinHandle<()>>>,
  options: CacheOptions,
}

impl DataCache {
  /// Create a cache with the system clock, an online connectivity flag and
  /// no change syncer.
  pub fn new(options: CacheOptions) -> Arc<Self> {
    DataCacheBuilder::new(options).build()
  }

  pub fn builder(options: CacheOptions) -> DataCacheBuilder {
    DataCacheBuilder::new(options)
  }

  pub fn store(&self) -> &CacheStore {
    &self.store
  }

  pub fn queue(&self) -> &PendingQueue {
    &self.queue
  }

  pub fn connectivity(&self) -> &Connectivity {
    &self.connectivity
  }

  pub fn options(&self) -> &CacheOptions {
    &self.options
  }

  pub fn is_online(&self) -> bool {
    self.connectivity.is_online()
  }

  pub fn now_ms(&self) -> i64 {
    self.clock.now_ms()
  }

  /// Queue a change for later sync. No-op when offline mode is disabled.
  pub fn add_pending_change(&self, change: PendingChange) -> bool {
    let added = self.queue.add(change);
    if added {
      debug!(pending = self.queue.len(), "queued pending change");
    }
    added
  }

  pub fn pending_changes(&self) -> Vec<PendingChange> {
    self.queue.list()
  }

  pub fn remove_pending_change(&self, id: &str) -> bool {
    self.queue.remove(id)
  }

  pub fn clear_pending_changes(&self) {
    self.queue.clear();
  }

  /// Remove every cached entry *and* every pending change.
  ///
  /// Use `store().clear()` or `clear_pending_changes()` to clear only one.
  pub fn clear(&self) {
    self.store.clear();
    self.queue.clear();
  }

  pub fn stats(&self) -> CacheStats {
    CacheStats {
      size: self.store.len(),
      max_size: self.store.max_size(),
      pending_changes: self.queue.len(),
      is_online: self.connectivity.is_online(),
    }
  }

  /// Receive [`SyncEvent`]s, including changes dropped after exhausting
  /// their retries.
  pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
    self.events.subscribe()
  }

  /// Replay every queued change through the configured syncer.
  pub async fn sync_pending_changes(&self) -> SyncSummary {
    let summary = self.sync.drain().await;
    if summary != SyncSummary::default() {
      info!(
        synced = summary.synced,
        dropped = summary.dropped,
        deferred = summary.deferred,
        "pending change sync finished"
      );
    }
    summary
  }
}

impl Drop for DataCache {
  fn drop(&mut self) {
    let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
    for task in tasks.drain(..) {
      task.abort();
    }
  }
}

impl std::fmt::Debug for DataCache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DataCache")
      .field("store", &self.store)
      .field("queue", &self.queue)
      .field("online", &self.connectivity.is_online())
      .finish_non_exhaustive()
  }
}

fn spawn_sweep(cache: Weak<DataCache>, interval: Duration) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately
    ticker.tick().await;
    loop {
      ticker.tick().await;
      let Some(cache) = cache.upgrade() else {
        break;
      };
      let removed = cache.store.purge_expired();
      if removed > 0 {
        debug!(removed, "swept expired cache entries");
      }
    }
  })
}

fn spawn_reconnect_watcher(cache: &Arc<DataCache>) -> JoinHandle<()> {
  let mut rx = cache.connectivity.subscribe();
  // Baseline is taken before spawning so a transition that lands before
  // the task first runs is still seen as one.
  let mut was_online = *rx.borrow_and_update();
  let weak = Arc::downgrade(cache);
  tokio::spawn(async move {
    while rx.changed().await.is_ok() {
      let online = *rx.borrow_and_update();
      let Some(cache) = weak.upgrade() else {
        break;
      };
      if online && !was_online {
        info!(pending = cache.queue.len(), "connection restored");
        if cache.options.sync_on_reconnect {
          tokio::spawn(async move {
            cache.sync_pending_changes().await;
          });
        }
      } else if !online {
        info!("connection lost, changes will be queued");
      }
      was_online = online;
    }
  })
}
