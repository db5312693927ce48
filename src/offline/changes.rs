//! Consumer-facing view of the pending change queue.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

use super::pending::{ChangeAction, PendingChange};
use crate::cache::DataCache;

/// Tracks connectivity and the pending change list for one consumer.
///
/// The list is a snapshot, re-read in full after every mutation made
/// through this handle and on every connectivity transition.
pub struct OfflineChanges {
  cache: Arc<DataCache>,
  online: watch::Receiver<bool>,
  pending: Vec<PendingChange>,
}

impl OfflineChanges {
  pub fn new(cache: Arc<DataCache>) -> Self {
    let online = cache.connectivity().subscribe();
    let pending = cache.pending_changes();
    Self {
      cache,
      online,
      pending,
    }
  }

  pub fn is_online(&self) -> bool {
    *self.online.borrow()
  }

  pub fn pending_changes(&self) -> &[PendingChange] {
    &self.pending
  }

  /// Record a change. With offline mode disabled nothing is queued, but the
  /// change is still returned.
  pub fn add_change(&mut self, action: ChangeAction, data: Value) -> PendingChange {
    let change = PendingChange::new(action, data, self.cache.now_ms());
    self.cache.add_pending_change(change.clone());
    self.refresh();
    change
  }

  pub fn remove_change(&mut self, id: &str) -> bool {
    let removed = self.cache.remove_pending_change(id);
    self.refresh();
    removed
  }

  pub fn clear_changes(&mut self) {
    self.cache.clear_pending_changes();
    self.refresh();
  }

  /// Re-read the pending list from the shared queue.
  pub fn refresh(&mut self) {
    self.pending = self.cache.pending_changes();
  }

  /// Wait for the next online/offline transition. Returns the new state, or
  /// `None` once the connectivity source is gone.
  pub async fn changed(&mut self) -> Option<bool> {
    self.online.changed().await.ok()?;
    let online = *self.online.borrow_and_update();
    self.refresh();
    Some(online)
  }
}

impl std::fmt::Debug for OfflineChanges {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("OfflineChanges")
      .field("online", &self.is_online())
      .field("pending", &self.pending.len())
      .finish()
  }
}
