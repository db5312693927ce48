//! Queue of mutations recorded while offline.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

const ID_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Kind of mutation a pending change represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
  Create,
  Update,
  Delete,
}

impl ChangeAction {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Create => "create",
      Self::Update => "update",
      Self::Delete => "delete",
    }
  }
}

impl fmt::Display for ChangeAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for ChangeAction {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "create" => Ok(Self::Create),
      "update" => Ok(Self::Update),
      "delete" => Ok(Self::Delete),
      other => Err(format!("unknown change action: {}", other)),
    }
  }
}

/// A mutation intent waiting to be replayed against the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
  pub id: String,
  pub action: ChangeAction,
  pub data: Value,
  pub timestamp: i64,
  pub retry_count: u32,
}

impl PendingChange {
  /// Create a change with a fresh `{action}_{timestamp}_{random}` id.
  pub fn new(action: ChangeAction, data: Value, timestamp: i64) -> Self {
    Self {
      id: format!("{}_{}_{}", action, timestamp, random_suffix()),
      action,
      data,
      timestamp,
      retry_count: 0,
    }
  }
}

fn random_suffix() -> String {
  let mut rng = rand::thread_rng();
  (0..ID_SUFFIX_LEN)
    .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
    .collect()
}

/// What happened to a change after a failed sync attempt.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FailureOutcome {
  /// Still queued with the given retry count
  Retry(u32),
  /// Retry budget exhausted; the change has been removed
  Dropped(PendingChange),
}

#[derive(Default)]
struct QueueState {
  /// Insertion order; ids are unique
  changes: Vec<PendingChange>,
  in_flight: HashSet<String>,
}

impl QueueState {
  fn position(&self, id: &str) -> Option<usize> {
    self.changes.iter().position(|c| c.id == id)
  }
}

/// In-memory pending change queue. Nothing is persisted.
pub struct PendingQueue {
  enabled: bool,
  state: Mutex<QueueState>,
}

impl PendingQueue {
  pub fn new(enabled: bool) -> Self {
    Self {
      enabled,
      state: Mutex::new(QueueState::default()),
    }
  }

  fn lock(&self) -> MutexGuard<'_, QueueState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn is_enabled(&self) -> bool {
    self.enabled
  }

  /// Queue a change. Returns `false` when offline mode is disabled.
  ///
  /// A change whose id is already queued replaces it in place.
  pub fn add(&self, change: PendingChange) -> bool {
    if !self.enabled {
      return false;
    }
    let mut state = self.lock();
    match state.position(&change.id) {
      Some(index) => state.changes[index] = change,
      None => state.changes.push(change),
    }
    true
  }

  /// Snapshot of all queued changes in insertion order.
  pub fn list(&self) -> Vec<PendingChange> {
    self.lock().changes.clone()
  }

  pub fn get(&self, id: &str) -> Option<PendingChange> {
    let state = self.lock();
    state.position(id).map(|index| state.changes[index].clone())
  }

  pub fn remove(&self, id: &str) -> bool {
    let mut state = self.lock();
    match state.position(id) {
      Some(index) => {
        state.changes.remove(index);
        true
      }
      None => false,
    }
  }

  pub fn clear(&self) {
    self.lock().changes.clear();
  }

  pub fn len(&self) -> usize {
    self.lock().changes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Mark a queued change as being synced. Returns `false` if it is gone or
  /// already being synced.
  pub(crate) fn try_begin(&self, id: &str) -> bool {
    let mut state = self.lock();
    state.position(id).is_some() && state.in_flight.insert(id.to_string())
  }

  pub(crate) fn finish(&self, id: &str) {
    self.lock().in_flight.remove(id);
  }

  /// Bump the retry count of `id`, dropping it once it reaches `max_retries`.
  /// Returns `None` if the change was removed in the meantime.
  pub(crate) fn record_failure(&self, id: &str, max_retries: u32) -> Option<FailureOutcome> {
    let mut state = self.lock();
    let index = state.position(id)?;
    let retry_count = {
      let change = &mut state.changes[index];
      change.retry_count += 1;
      change.retry_count
    };
    if retry_count >= max_retries {
      Some(FailureOutcome::Dropped(state.changes.remove(index)))
    } else {
      Some(FailureOutcome::Retry(retry_count))
    }
  }
}

impl fmt::Debug for PendingQueue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PendingQueue")
      .field("enabled", &self.enabled)
      .field("len", &self.len())
      .finish()
  }
}
