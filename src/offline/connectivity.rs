//! Shared online/offline flag.

use std::sync::Arc;
use tokio::sync::watch;

/// Online/offline state shared between the cache, its consumers and
/// whatever detects network changes.
///
/// Subscribers are only woken on actual transitions.
#[derive(Debug, Clone)]
pub struct Connectivity {
  tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
  pub fn new(online: bool) -> Self {
    let (tx, _rx) = watch::channel(online);
    Self { tx: Arc::new(tx) }
  }

  pub fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  /// Record the current network state. Returns `true` if this was a transition.
  pub fn set_online(&self, online: bool) -> bool {
    self.tx.send_if_modified(|current| {
      if *current == online {
        false
      } else {
        *current = online;
        true
      }
    })
  }

  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }
}

impl Default for Connectivity {
  fn default() -> Self {
    Self::new(true)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_only_transitions_are_reported() {
    let connectivity = Connectivity::new(true);
    assert!(!connectivity.set_online(true));
    assert!(connectivity.set_online(false));
    assert!(!connectivity.is_online());
    assert!(connectivity.set_online(true));
  }

  #[tokio::test]
  async fn test_subscribers_see_changes() {
    let connectivity = Connectivity::new(true);
    let mut rx = connectivity.subscribe();

    let clone = connectivity.clone();
    clone.set_online(false);

    rx.changed().await.unwrap();
    assert!(!*rx.borrow_and_update());
  }
}
