use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheOptions;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the portal REST API, e.g. "https://portal.example.com/api/v1/"
  pub url: String,
  /// Path polled to decide whether the client is online
  #[serde(default = "default_health_path")]
  pub health_path: String,
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
  /// Health poll interval while online
  #[serde(default = "default_probe_interval_ms")]
  pub probe_interval_ms: u64,
}

fn default_health_path() -> String {
  "health".to_string()
}

fn default_timeout_ms() -> u64 {
  10_000
}

fn default_probe_interval_ms() -> u64 {
  15_000
}

/// Cache settings. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub ttl_ms: u64,
  pub max_size: usize,
  pub enable_offline: bool,
  pub sync_on_reconnect: bool,
  pub max_retries: u32,
  pub retry_base_delay_ms: u64,
  pub cleanup_interval_ms: u64,
  pub stats_interval_ms: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    let options = CacheOptions::default();
    Self {
      ttl_ms: millis(options.ttl),
      max_size: options.max_size,
      enable_offline: options.enable_offline,
      sync_on_reconnect: options.sync_on_reconnect,
      max_retries: options.max_retries,
      retry_base_delay_ms: millis(options.retry_base_delay),
      cleanup_interval_ms: millis(options.cleanup_interval),
      stats_interval_ms: millis(crate::stats::DEFAULT_STATS_INTERVAL),
    }
  }
}

fn millis(duration: Duration) -> u64 {
  u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl CacheConfig {
  pub fn options(&self) -> CacheOptions {
    CacheOptions {
      ttl: Duration::from_millis(self.ttl_ms),
      max_size: self.max_size,
      enable_offline: self.enable_offline,
      sync_on_reconnect: self.sync_on_reconnect,
      max_retries: self.max_retries,
      retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
      cleanup_interval: Duration::from_millis(self.cleanup_interval_ms),
    }
  }

  pub fn stats_interval(&self) -> Duration {
    Duration::from_millis(self.stats_interval_ms)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./portal-cache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/portal-cache/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/portal-cache/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("portal-cache.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("portal-cache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
  }

  /// Reject settings the background tasks cannot run with.
  fn validate(&self) -> Result<()> {
    let intervals = [
      ("api.timeout_ms", self.api.timeout_ms),
      ("api.probe_interval_ms", self.api.probe_interval_ms),
      ("cache.cleanup_interval_ms", self.cache.cleanup_interval_ms),
      ("cache.stats_interval_ms", self.cache.stats_interval_ms),
    ];
    for (name, value) in intervals {
      if value == 0 {
        return Err(eyre!("{} must be greater than zero", name));
      }
    }
    Ok(())
  }

  /// Get the API bearer token from the environment, if set.
  ///
  /// Checks PORTAL_API_TOKEN.
  pub fn get_api_token() -> Option<String> {
    std::env::var("PORTAL_API_TOKEN")
      .ok()
      .filter(|token| !token.is_empty())
  }
}
