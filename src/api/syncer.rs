use super::client::ApiClient;
use crate::offline::{ChangeSyncer, PendingChange, SyncFuture};

/// Replays pending changes against the portal REST API.
#[derive(Clone, Debug)]
pub struct RestSyncer {
  client: ApiClient,
}

impl RestSyncer {
  pub fn new(client: ApiClient) -> Self {
    Self { client }
  }
}

impl ChangeSyncer for RestSyncer {
  fn sync(&self, change: PendingChange) -> SyncFuture {
    let client = self.client.clone();
    Box::pin(async move { client.send_change(&change).await })
  }
}
