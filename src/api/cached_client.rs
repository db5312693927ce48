//! Cached portal client that wraps ApiClient with the shared data cache.

use color_eyre::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

use super::client::ApiClient;
use super::resource::ResourceKey;
use super::syncer::RestSyncer;
use crate::cache::{CacheOptions, DataCache};
use crate::config::Config;
use crate::offline::Connectivity;
use crate::query::{CachedQuery, FetchOptions, FetchOutcome};

/// Portal client with transparent caching and offline change replay.
#[derive(Clone, Debug)]
pub struct CachedApiClient {
  inner: ApiClient,
  cache: Arc<DataCache>,
}

impl CachedApiClient {
  /// Create a client and a cache whose pending changes are replayed
  /// against the same API.
  pub fn new(config: &Config, connectivity: Connectivity) -> Result<Self> {
    let inner = ApiClient::new(&config.api)?;
    let cache = Self::build_cache(&inner, config.cache.options(), connectivity);
    Ok(Self { inner, cache })
  }

  pub fn build_cache(
    inner: &ApiClient,
    options: CacheOptions,
    connectivity: Connectivity,
  ) -> Arc<DataCache> {
    DataCache::builder(options)
      .connectivity(connectivity)
      .syncer(RestSyncer::new(inner.clone()))
      .build()
  }

  pub fn inner(&self) -> &ApiClient {
    &self.inner
  }

  pub fn cache(&self) -> &Arc<DataCache> {
    &self.cache
  }

  /// Create a query for `resource` backed by this client.
  pub fn query<T>(&self, resource: ResourceKey) -> ResourceQuery<T>
  where
    T: Clone + Serialize + DeserializeOwned + Send + 'static,
  {
    ResourceQuery {
      query: CachedQuery::new(Arc::clone(&self.cache), resource.cache_key()),
      client: self.inner.clone(),
      resource,
    }
  }
}

/// A [`CachedQuery`] bound to one portal resource.
pub struct ResourceQuery<T> {
  query: CachedQuery<T>,
  client: ApiClient,
  resource: ResourceKey,
}

impl<T> ResourceQuery<T>
where
  T: Clone + Serialize + DeserializeOwned + Send + 'static,
{
  pub fn resource(&self) -> &ResourceKey {
    &self.resource
  }

  pub fn query(&self) -> &CachedQuery<T> {
    &self.query
  }

  /// Fetch through the cache.
  pub async fn fetch(&self, options: FetchOptions) -> FetchOutcome<T> {
    let client = self.client.clone();
    let resource = self.resource.clone();
    self
      .query
      .fetch_data(
        move || async move { client.get_resource::<T>(&resource).await },
        options,
      )
      .await
  }

  /// Fetch from the network regardless of what is cached.
  pub async fn refresh(&self) -> FetchOutcome<T> {
    self.fetch(FetchOptions::forced()).await
  }
}
