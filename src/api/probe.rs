//! Health polling that feeds the shared connectivity flag.

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::client::ApiClient;
use crate::offline::Connectivity;

/// First reconnect delay after the API stops answering.
const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Polls the API health endpoint and records the result in [`Connectivity`].
///
/// While online the endpoint is polled every `interval` (at least one
/// second). While offline the delay starts at one second and doubles up to
/// `interval`, so a recovered API is noticed quickly.
pub struct ConnectivityProbe {
  client: ApiClient,
  health_path: String,
  connectivity: Connectivity,
  interval: Duration,
}

impl ConnectivityProbe {
  pub fn new(
    client: ApiClient,
    health_path: impl Into<String>,
    connectivity: Connectivity,
    interval: Duration,
  ) -> Self {
    Self {
      client,
      health_path: health_path.into(),
      connectivity,
      interval: interval.max(RECONNECT_BASE_DELAY),
    }
  }

  /// Run one health check and record it. Returns the observed state.
  pub async fn check(&self) -> bool {
    let online = self.client.check_health(&self.health_path).await;
    if self.connectivity.set_online(online) {
      info!(online, "connectivity changed");
    }
    online
  }

  /// Delay before the next check, given the consecutive failure count.
  fn next_delay(&self, failures: u32) -> Duration {
    if failures == 0 {
      return self.interval;
    }
    let backoff = RECONNECT_BASE_DELAY.saturating_mul(2u32.saturating_pow(failures - 1));
    backoff.min(self.interval)
  }

  /// Poll until the returned handle is aborted.
  pub fn spawn(self) -> JoinHandle<()> {
    tokio::spawn(async move {
      let mut failures = 0u32;
      loop {
        if self.check().await {
          failures = 0;
        } else {
          failures = failures.saturating_add(1);
        }
        let delay = self.next_delay(failures);
        debug!(failures, ?delay, "next health check scheduled");
        tokio::time::sleep(delay).await;
      }
    })
  }
}
