//! # portal-cache
//!
//! Client-side data cache and offline change queue for the SSO portal API.
//!
//! - [`DataCache`]: the shared store (TTL expiry, size cap, periodic sweep)
//!   plus the pending change queue and the online/offline flag
//! - [`CachedQuery`]: one consumer's view of one cache key, with fetch,
//!   optimistic update, invalidate and refresh
//! - [`OfflineChanges`]: records mutations while offline; they are replayed
//!   with exponential backoff once the client reconnects
//! - [`StatsMonitor`]: periodic size/pending/online snapshots
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use portal_cache::{CacheOptions, CachedQuery, DataCache, FetchOptions};
//!
//! let cache = DataCache::new(CacheOptions::default());
//! let orgs: CachedQuery<Vec<Org>> = CachedQuery::new(cache.clone(), "organizations");
//!
//! let outcome = orgs
//!   .fetch_data(|| async move { api.get_json("organizations").await }, FetchOptions::default())
//!   .await;
//! ```

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod logging;
pub mod offline;
pub mod query;
pub mod stats;

pub use cache::{
  CacheEntry, CacheOptions, CacheResult, CacheSource, CacheStore, DataCache, DataCacheBuilder,
  SetOptions,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use offline::{
  ChangeAction, ChangeSyncer, Connectivity, OfflineChanges, PendingChange, PendingQueue,
  RetryPolicy, SyncEvent, SyncSummary,
};
pub use query::{
  CachedQuery, FetchOptions, FetchOutcome, OptimisticOptions, OptimisticUpdate, QueryView,
  OFFLINE_FALLBACK_MESSAGE,
};
pub use stats::{CacheStats, StatsMonitor};
