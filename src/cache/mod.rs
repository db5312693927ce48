//! In-memory caching layer.
//!
//! This module provides:
//! - A keyed TTL store with lazy expiry on read, a periodic sweep, and a
//!   size cap that evicts the oldest writes first
//! - The shared [`DataCache`] instance that ties the store to the pending
//!   change queue and the connectivity flag

mod entry;
mod shared;
mod store;
mod traits;

pub use entry::{CacheEntry, STALE_RATIO};
pub use shared::{CacheOptions, DataCache, DataCacheBuilder};
pub use store::{CacheStore, SetOptions};
pub use traits::{CacheResult, CacheSource};
