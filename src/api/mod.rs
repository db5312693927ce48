//! Portal REST API collaborators: the HTTP client, resource keys, the
//! cached client, the pending change syncer and the health probe.

pub mod cached_client;
pub mod client;
pub mod probe;
pub mod resource;
pub mod syncer;

pub use cached_client::{CachedApiClient, ResourceQuery};
pub use client::{ApiClient, ChangePayload};
pub use probe::ConnectivityProbe;
pub use resource::ResourceKey;
pub use syncer::RestSyncer;
