//! Per-consumer query bound to one cache key.
//!
//! A `CachedQuery<T>` is the unit a view holds on to: it reads through the
//! shared [`DataCache`], calls a fetcher on miss or forced refresh, writes
//! results back, and keeps its own `data / is_loading / error / is_stale`
//! mirror. Two queries on the same key share the cached value but not that
//! local state.
//!
//! # Example
//!
//! ```ignore
//! let users: CachedQuery<Vec<User>> = CachedQuery::new(cache.clone(), "users:acme");
//!
//! let outcome = users
//!   .fetch_data(|| async move { api.get_json("/organizations/acme/users").await }, FetchOptions::default())
//!   .await;
//!
//! let view = users.state();
//! if let Some(error) = &view.error {
//!   render_banner(error);
//! }
//! ```

use color_eyre::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheResult, DataCache, SetOptions};

/// Error message shown when a failed fetch falls back to cached data.
pub const OFFLINE_FALLBACK_MESSAGE: &str = "Using cached data (offline mode)";

/// Local state mirror of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryView<T> {
  pub data: Option<T>,
  pub is_loading: bool,
  pub error: Option<String>,
  pub is_stale: bool,
}

impl<T> Default for QueryView<T> {
  fn default() -> Self {
    Self {
      data: None,
      is_loading: false,
      error: None,
      is_stale: false,
    }
  }
}

/// Options for [`CachedQuery::fetch_data`].
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
  /// Skip the cache lookup and always call the fetcher
  pub force: bool,
  pub ttl: Option<Duration>,
  pub version: Option<String>,
}

impl FetchOptions {
  pub fn forced() -> Self {
    Self {
      force: true,
      ..Self::default()
    }
  }
}

/// Options for optimistic writes.
#[derive(Debug, Clone)]
pub struct OptimisticOptions {
  /// Roll back automatically when the remote call of [`CachedQuery::mutate`] fails
  pub rollback_on_error: bool,
  pub ttl: Option<Duration>,
  pub version: Option<String>,
}

impl Default for OptimisticOptions {
  fn default() -> Self {
    Self {
      rollback_on_error: true,
      ttl: None,
      version: None,
    }
  }
}

/// How a call to [`CachedQuery::fetch_data`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
  /// Data was produced, from the network or the cache
  Loaded(CacheResult<T>),
  /// The fetcher failed and no offline fallback applied
  Failed(String),
  /// A newer fetch or an invalidation replaced this one; nothing was applied
  Superseded,
}

impl<T> FetchOutcome<T> {
  pub fn data(&self) -> Option<&T> {
    match self {
      FetchOutcome::Loaded(result) => Some(&result.data),
      _ => None,
    }
  }

  pub fn into_data(self) -> Option<T> {
    match self {
      FetchOutcome::Loaded(result) => Some(result.data),
      _ => None,
    }
  }
}

/// Cache-backed query for one key.
pub struct CachedQuery<T> {
  key: String,
  cache: Arc<DataCache>,
  ttl: Option<Duration>,
  state: Mutex<QueryView<T>>,
  inflight: Mutex<Option<AbortHandle>>,
  generation: AtomicU64,
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> CachedQuery<T>
where
  T: Clone + Serialize + DeserializeOwned + Send + 'static,
{
  pub fn new(cache: Arc<DataCache>, key: impl Into<String>) -> Self {
    Self {
      key: key.into(),
      cache,
      ttl: None,
      state: Mutex::new(QueryView::default()),
      inflight: Mutex::new(None),
      generation: AtomicU64::new(0),
    }
  }

  /// Default TTL for writes made by this query, instead of the cache-wide one.
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = Some(ttl);
    self
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn state(&self) -> QueryView<T> {
    lock(&self.state).clone()
  }

  pub fn data(&self) -> Option<T> {
    lock(&self.state).data.clone()
  }

  pub fn error(&self) -> Option<String> {
    lock(&self.state).error.clone()
  }

  pub fn is_loading(&self) -> bool {
    lock(&self.state).is_loading
  }

  pub fn is_stale(&self) -> bool {
    lock(&self.state).is_stale
  }

  fn set_options(&self, ttl: Option<Duration>, version: Option<String>) -> SetOptions {
    SetOptions {
      ttl: ttl.or(self.ttl),
      version,
    }
  }

  fn write_through(&self, data: &T, options: SetOptions) {
    if let Err(e) = self.cache.store().set_json(&self.key, data, options) {
      warn!(key = %self.key, error = %e, "could not write value to cache");
    }
  }

  /// Read the live cache entry as `T`. A value that no longer decodes as `T`
  /// is treated as a miss.
  fn cached_entry(&self) -> Option<(T, CacheEntry)> {
    let entry = self.cache.store().get_entry(&self.key)?;
    match serde_json::from_value::<T>(entry.data.clone()) {
      Ok(data) => Some((data, entry)),
      Err(e) => {
        warn!(key = %self.key, error = %e, "cached value has unexpected shape");
        None
      }
    }
  }

  fn load_cached(&self) -> Option<CacheResult<T>> {
    let (data, entry) = self.cached_entry()?;
    let is_stale = entry.is_stale(self.cache.now_ms());

    let mut state = lock(&self.state);
    state.data = Some(data.clone());
    state.is_stale = is_stale;
    Some(CacheResult::from_cache(data, entry.timestamp, is_stale))
  }

  /// Populate the local state from the cache. Returns the cached value, if any.
  pub fn load_from_cache(&self) -> Option<T> {
    self.load_cached().map(|result| result.data)
  }

  /// Abort the in-flight fetch, if any, and make its result inapplicable.
  fn cancel_inflight(&self) -> u64 {
    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
    if let Some(previous) = lock(&self.inflight).take() {
      previous.abort();
    }
    generation
  }

  /// Return cached data, or call `fetcher` and store its result.
  ///
  /// Without `force`, a live cache entry is returned and `fetcher` is not
  /// called; while online this also clears an earlier offline notice. Otherwise any earlier fetch from this query is aborted (its
  /// future is dropped, cancelling the request) and only this call's result
  /// is applied. Failures end up in the `error` state; they are never
  /// returned as `Err`. While offline, a failed fetch falls back to the
  /// cached value with an informational error.
  pub async fn fetch_data<F, Fut>(&self, fetcher: F, options: FetchOptions) -> FetchOutcome<T>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    if !options.force {
      if let Some(hit) = self.load_cached() {
        debug!(key = %self.key, source = ?hit.source, "cache hit");
        if self.cache.is_online() {
          lock(&self.state).error = None;
        }
        return FetchOutcome::Loaded(hit);
      }
    }

    let generation = self.cancel_inflight();
    {
      let mut state = lock(&self.state);
      state.is_loading = true;
      state.error = None;
    }

    let task = tokio::spawn(fetcher());
    *lock(&self.inflight) = Some(task.abort_handle());
    let result = task.await;

    let mut state = lock(&self.state);
    if self.generation.load(Ordering::SeqCst) != generation {
      debug!(key = %self.key, "discarding superseded fetch result");
      return FetchOutcome::Superseded;
    }
    *lock(&self.inflight) = None;
    state.is_loading = false;

    match result {
      Ok(Ok(data)) => {
        self.write_through(&data, self.set_options(options.ttl, options.version));
        state.data = Some(data.clone());
        state.is_stale = false;
        state.error = None;
        FetchOutcome::Loaded(CacheResult::from_network(data))
      }
      Ok(Err(e)) => self.apply_failure(&mut state, format!("{:#}", e)),
      Err(e) if e.is_cancelled() => FetchOutcome::Superseded,
      Err(e) => self.apply_failure(&mut state, format!("fetch task failed: {}", e)),
    }
  }

  fn apply_failure(&self, state: &mut QueryView<T>, message: String) -> FetchOutcome<T> {
    warn!(key = %self.key, error = %message, "fetch failed");

    if !self.cache.is_online() {
      if let Some((data, entry)) = self.cached_entry() {
        debug!(key = %self.key, "serving cached value while offline");
        state.data = Some(data.clone());
        state.is_stale = entry.is_stale(self.cache.now_ms());
        state.error = Some(OFFLINE_FALLBACK_MESSAGE.to_string());
        return FetchOutcome::Loaded(CacheResult::offline(data, entry.timestamp));
      }
    }

    state.error = Some(message.clone());
    FetchOutcome::Failed(message)
  }

  /// Same as `fetch_data` with `force` set.
  pub async fn refresh<F, Fut>(&self, fetcher: F) -> FetchOutcome<T>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    self.fetch_data(fetcher, FetchOptions::forced()).await
  }

  /// Apply `updater` to the current value in both the cache and local state.
  ///
  /// The returned handle must be rolled back explicitly if the change is
  /// later rejected; nothing happens automatically.
  pub fn optimistic_update<U>(
    &self,
    updater: U,
    options: OptimisticOptions,
  ) -> OptimisticUpdate<'_, T>
  where
    U: FnOnce(Option<&T>) -> T,
  {
    let previous = match self.data() {
      Some(data) => Some(data),
      None => self.cached_entry().map(|(data, _)| data),
    };
    let next = updater(previous.as_ref());

    let set_options = self.set_options(options.ttl, options.version);
    self.write_through(&next, set_options.clone());
    lock(&self.state).data = Some(next.clone());

    OptimisticUpdate {
      query: self,
      previous,
      applied: next,
      set_options,
    }
  }

  /// Optimistically apply `updater`, then run `remote` with the new value.
  ///
  /// When `remote` fails and `rollback_on_error` is set, the previous value
  /// is restored before the error is returned.
  pub async fn mutate<U, F, Fut, R>(
    &self,
    updater: U,
    remote: F,
    options: OptimisticOptions,
  ) -> Result<R>
  where
    U: FnOnce(Option<&T>) -> T,
    F: FnOnce(T) -> Fut,
    Fut: Future<Output = Result<R>>,
  {
    let rollback_on_error = options.rollback_on_error;
    let update = self.optimistic_update(updater, options);
    let applied = update.value().clone();

    match remote(applied).await {
      Ok(result) => {
        update.commit();
        Ok(result)
      }
      Err(e) => {
        if rollback_on_error {
          debug!(key = %self.key, "remote mutation failed, rolling back");
          update.rollback();
        } else {
          update.commit();
        }
        Err(e)
      }
    }
  }

  /// Drop the key from the shared cache and reset local state.
  pub fn invalidate(&self) {
    self.cancel_inflight();
    self.cache.store().delete(&self.key);
    *lock(&self.state) = QueryView::default();
  }
}

impl<T> Drop for CachedQuery<T> {
  fn drop(&mut self) {
    let inflight = self.inflight.get_mut().unwrap_or_else(PoisonError::into_inner);
    if let Some(handle) = inflight.take() {
      handle.abort();
    }
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for CachedQuery<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CachedQuery")
      .field("key", &self.key)
      .field("state", &*lock(&self.state))
      .field("ttl", &self.ttl)
      .finish_non_exhaustive()
  }
}

/// Handle for an applied optimistic update.
#[must_use = "an optimistic update should be committed or rolled back"]
pub struct OptimisticUpdate<'a, T>
where
  T: Clone + Serialize + DeserializeOwned + Send + 'static,
{
  query: &'a CachedQuery<T>,
  previous: Option<T>,
  applied: T,
  set_options: SetOptions,
}

impl<T> OptimisticUpdate<'_, T>
where
  T: Clone + Serialize + DeserializeOwned + Send + 'static,
{
  /// The value that was written.
  pub fn value(&self) -> &T {
    &self.applied
  }

  /// The value before the update, if there was one.
  pub fn previous(&self) -> Option<&T> {
    self.previous.as_ref()
  }

  /// Restore the previous value in the cache and the local state. If there
  /// was none, the key is removed.
  pub fn rollback(self) {
    let query = self.query;
    match self.previous {
      Some(previous) => {
        query.write_through(&previous, self.set_options);
        lock(&query.state).data = Some(previous);
      }
      None => {
        query.cache.store().delete(&query.key);
        lock(&query.state).data = None;
      }
    }
  }

  /// Keep the optimistic value. It is already stored, so this only consumes
  /// the handle.
  pub fn commit(self) {}
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheOptions, CacheSource};
  use crate::clock::ManualClock;
  use color_eyre::eyre::eyre;
  use serde_json::json;
  use std::sync::atomic::AtomicU32;

  fn cache() -> Arc<DataCache> {
    DataCache::new(CacheOptions::default())
  }

  #[tokio::test]
  async fn test_fetch_writes_through() {
    let cache = cache();
    let query: CachedQuery<Vec<u32>> = CachedQuery::new(cache.clone(), "ids");

    let outcome = query
      .fetch_data(|| async { Ok(vec![1, 2, 3]) }, FetchOptions::default())
      .await;

    assert_eq!(outcome, FetchOutcome::Loaded(CacheResult::from_network(vec![1, 2, 3])));
    assert_eq!(cache.store().get("ids"), Some(json!([1, 2, 3])));
    let view = query.state();
    assert_eq!(view.data, Some(vec![1, 2, 3]));
    assert!(!view.is_loading);
    assert!(view.error.is_none());
  }

  #[tokio::test]
  async fn test_cache_hit_skips_fetcher() {
    let cache = cache();
    cache.store().set("n", json!(7), SetOptions::default());
    let query: CachedQuery<u32> = CachedQuery::new(cache, "n");

    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let outcome = query
      .fetch_data(
        move || {
          counter.fetch_add(1, Ordering::SeqCst);
          async { Ok(8) }
        },
        FetchOptions::default(),
      )
      .await;

    assert_eq!(outcome.data(), Some(&7));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(query.data(), Some(7));
  }

  #[tokio::test]
  async fn test_refresh_forces_fetch() {
    let cache = cache();
    cache.store().set("n", json!(7), SetOptions::default());
    let query: CachedQuery<u32> = CachedQuery::new(cache.clone(), "n");

    let outcome = query.refresh(|| async { Ok(8) }).await;
    assert_eq!(outcome.into_data(), Some(8));
    assert_eq!(cache.store().get("n"), Some(json!(8)));
  }

  #[tokio::test]
  async fn test_newer_fetch_discards_older_result() {
    let query: CachedQuery<String> = CachedQuery::new(cache(), "race");

    let slow = query.fetch_data(
      || async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok("a".to_string())
      },
      FetchOptions::forced(),
    );
    let fast = async {
      // Let the slow fetch start first
      tokio::time::sleep(Duration::from_millis(5)).await;
      query
        .fetch_data(|| async { Ok("b".to_string()) }, FetchOptions::forced())
        .await
    };

    let (slow, fast) = tokio::join!(slow, fast);
    assert_eq!(slow, FetchOutcome::Superseded);
    assert_eq!(fast.into_data().as_deref(), Some("b"));

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(query.data().as_deref(), Some("b"));
  }

  #[tokio::test]
  async fn test_failure_sets_error() {
    let query: CachedQuery<u32> = CachedQuery::new(cache(), "broken");

    let outcome = query
      .fetch_data(|| async { Err(eyre!("HTTP 500")) }, FetchOptions::default())
      .await;

    assert_eq!(outcome, FetchOutcome::Failed("HTTP 500".to_string()));
    let view = query.state();
    assert_eq!(view.error.as_deref(), Some("HTTP 500"));
    assert!(!view.is_loading);
    assert!(view.data.is_none());
  }

  #[tokio::test]
  async fn test_offline_failure_falls_back_to_cache() {
    let cache = cache();
    cache.store().set("orgs", json!(["acme"]), SetOptions::default());
    cache.connectivity().set_online(false);
    let query: CachedQuery<Vec<String>> = CachedQuery::new(cache, "orgs");

    let outcome = query
      .fetch_data(|| async { Err(eyre!("network unreachable")) }, FetchOptions::forced())
      .await;

    match outcome {
      FetchOutcome::Loaded(result) => {
        assert_eq!(result.source, CacheSource::Offline);
        assert_eq!(result.data, vec!["acme".to_string()]);
      }
      other => panic!("expected offline fallback, got {:?}", other),
    }
    assert_eq!(query.data(), Some(vec!["acme".to_string()]));
    assert_eq!(query.error().as_deref(), Some(OFFLINE_FALLBACK_MESSAGE));
  }

  #[tokio::test]
  async fn test_cache_hit_after_reconnect_clears_offline_notice() {
    let cache = cache();
    cache.store().set("orgs", json!(["acme"]), SetOptions::default());
    cache.connectivity().set_online(false);
    let query: CachedQuery<Vec<String>> = CachedQuery::new(cache.clone(), "orgs");

    query
      .fetch_data(|| async { Err(eyre!("network unreachable")) }, FetchOptions::forced())
      .await;
    assert_eq!(query.error().as_deref(), Some(OFFLINE_FALLBACK_MESSAGE));

    // Still offline: the notice stays
    query
      .fetch_data(|| async { Ok(vec![]) }, FetchOptions::default())
      .await;
    assert_eq!(query.error().as_deref(), Some(OFFLINE_FALLBACK_MESSAGE));

    cache.connectivity().set_online(true);
    let outcome = query
      .fetch_data(|| async { Ok(vec![]) }, FetchOptions::default())
      .await;
    assert_eq!(outcome.data(), Some(&vec!["acme".to_string()]));
    assert_eq!(query.error(), None);
  }

  #[tokio::test]
  async fn test_online_failure_does_not_fall_back() {
    let cache = cache();
    cache.store().set("orgs", json!(["acme"]), SetOptions::default());
    let query: CachedQuery<Vec<String>> = CachedQuery::new(cache, "orgs");

    let outcome = query
      .fetch_data(|| async { Err(eyre!("HTTP 503")) }, FetchOptions::forced())
      .await;
    assert_eq!(outcome, FetchOutcome::Failed("HTTP 503".to_string()));
  }

  #[tokio::test]
  async fn test_staleness_is_advisory() {
    let clock = Arc::new(ManualClock::new(0));
    let cache = DataCache::builder(CacheOptions::default())
      .clock(clock.clone())
      .build();
    cache
      .store()
      .set("k", json!(1), SetOptions::with_ttl(Duration::from_millis(1_000)));
    let query: CachedQuery<u32> = CachedQuery::new(cache, "k");

    clock.advance(500);
    assert_eq!(query.load_from_cache(), Some(1));
    assert!(!query.is_stale());

    clock.advance(350);
    let outcome = query
      .fetch_data(|| async { Ok(2) }, FetchOptions::default())
      .await;
    assert_eq!(outcome, FetchOutcome::Loaded(CacheResult::from_cache(1, 0, true)));
    assert!(query.is_stale());

    clock.advance(200);
    assert_eq!(query.load_from_cache(), None);
  }

  #[test]
  fn test_optimistic_update_and_rollback() {
    let cache = cache();
    cache.store().set("count", json!(1), SetOptions::default());
    let query: CachedQuery<u32> = CachedQuery::new(cache.clone(), "count");

    let update =
      query.optimistic_update(|v| v.copied().unwrap_or(0) + 1, OptimisticOptions::default());
    assert_eq!(update.previous(), Some(&1));
    assert_eq!(cache.store().get("count"), Some(json!(2)));
    assert_eq!(query.data(), Some(2));

    update.rollback();
    assert_eq!(cache.store().get("count"), Some(json!(1)));
    assert_eq!(query.data(), Some(1));
  }

  #[test]
  fn test_rollback_without_previous_removes_key() {
    let cache = cache();
    let query: CachedQuery<u32> = CachedQuery::new(cache.clone(), "fresh");

    let update = query.optimistic_update(|_| 5, OptimisticOptions::default());
    assert_eq!(cache.store().get("fresh"), Some(json!(5)));
    update.rollback();
    assert!(!cache.store().contains_key("fresh"));
    assert_eq!(query.data(), None);
  }

  #[test]
  fn test_commit_keeps_value() {
    let cache = cache();
    let query: CachedQuery<u32> = CachedQuery::new(cache.clone(), "k");
    query
      .optimistic_update(|_| 9, OptimisticOptions::default())
      .commit();
    assert_eq!(cache.store().get("k"), Some(json!(9)));
  }

  #[tokio::test]
  async fn test_mutate_rolls_back_on_error() {
    let cache = cache();
    cache.store().set("name", json!("old"), SetOptions::default());
    let query: CachedQuery<String> = CachedQuery::new(cache.clone(), "name");

    let result: Result<()> = query
      .mutate(
        |_| "new".to_string(),
        |value| async move {
          assert_eq!(value, "new");
          Err(eyre!("rejected"))
        },
        OptimisticOptions::default(),
      )
      .await;

    assert!(result.is_err());
    assert_eq!(cache.store().get("name"), Some(json!("old")));
    assert_eq!(query.data(), Some("old".to_string()));
  }

  #[tokio::test]
  async fn test_mutate_keeps_value_when_rollback_disabled() {
    let cache = cache();
    cache.store().set("name", json!("old"), SetOptions::default());
    let query: CachedQuery<String> = CachedQuery::new(cache.clone(), "name");

    let options = OptimisticOptions {
      rollback_on_error: false,
      ..OptimisticOptions::default()
    };
    let result: Result<()> = query
      .mutate(|_| "new".to_string(), |_| async { Err(eyre!("rejected")) }, options)
      .await;

    assert!(result.is_err());
    assert_eq!(cache.store().get("name"), Some(json!("new")));
  }

  #[tokio::test]
  async fn test_invalidate_clears_cache_and_state() {
    let cache = cache();
    let query: CachedQuery<u32> = CachedQuery::new(cache.clone(), "k");
    query
      .fetch_data(|| async { Ok(1) }, FetchOptions::default())
      .await;

    query.invalidate();
    assert!(!cache.store().contains_key("k"));
    assert_eq!(query.state(), QueryView::default());
  }

  #[tokio::test]
  async fn test_invalidate_discards_inflight_fetch() {
    let cache = cache();
    let query: CachedQuery<u32> = CachedQuery::new(cache.clone(), "k");

    let fetch = query.fetch_data(
      || async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(1)
      },
      FetchOptions::default(),
    );
    let invalidate = async {
      tokio::time::sleep(Duration::from_millis(5)).await;
      query.invalidate();
    };

    let (outcome, ()) = tokio::join!(fetch, invalidate);
    assert_eq!(outcome, FetchOutcome::Superseded);
    assert!(!cache.store().contains_key("k"));
    assert!(!query.is_loading());
  }

  #[tokio::test]
  async fn test_dropping_query_aborts_inflight_fetch() {
    let cache = cache();
    let query: CachedQuery<u32> = CachedQuery::new(cache.clone(), "k");
    let finished = Arc::new(AtomicU32::new(0));
    let counter = finished.clone();

    let pending = tokio::time::timeout(
      Duration::from_millis(10),
      query.fetch_data(
        move || async move {
          tokio::time::sleep(Duration::from_millis(50)).await;
          counter.fetch_add(1, Ordering::SeqCst);
          Ok(1)
        },
        FetchOptions::default(),
      ),
    )
    .await;
    assert!(pending.is_err());

    drop(query);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(finished.load(Ordering::SeqCst), 0);
    assert!(!cache.store().contains_key("k"));
  }

  #[tokio::test]
  async fn test_separate_queries_keep_separate_state() {
    let cache = cache();
    let a: CachedQuery<u32> = CachedQuery::new(cache.clone(), "shared");
    let b: CachedQuery<u32> = CachedQuery::new(cache.clone(), "shared");

    a.fetch_data(|| async { Ok(1) }, FetchOptions::default()).await;
    assert_eq!(a.data(), Some(1));
    assert_eq!(b.data(), None);

    assert_eq!(b.load_from_cache(), Some(1));
  }
}
