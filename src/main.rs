use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use portal_cache::api::{CachedApiClient, ConnectivityProbe, ResourceKey};
use portal_cache::config::Config;
use portal_cache::{
  logging, ChangeAction, Connectivity, FetchOptions, FetchOutcome, OfflineChanges, StatsMonitor,
  SyncEvent,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "portal-cache")]
#[command(about = "Cached, offline-tolerant access to the SSO portal API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/portal-cache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Log to stderr instead of the log file
  #[arg(long)]
  log_stderr: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch a resource through the cache and print it as JSON
  Fetch {
    /// Resource, e.g. organizations, users:ORG, audit-logs:ORG:2
    resource: ResourceKey,

    /// Keep fetching every N seconds until interrupted
    #[arg(short, long)]
    interval: Option<u64>,

    /// Always go to the network
    #[arg(short, long)]
    force: bool,
  },
  /// Queue a change and replay it against the API
  Push {
    /// create, update or delete
    action: ChangeAction,

    /// Path relative to the API base URL
    resource: String,

    /// JSON request body
    body: Option<String>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init(args.log_stderr)?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  match args.command {
    Command::Fetch {
      resource,
      interval,
      force,
    } => run_fetch(&config, resource, interval, force).await,
    Command::Push {
      action,
      resource,
      body,
    } => run_push(&config, action, resource, body).await,
  }
}

fn probe_for(
  config: &Config,
  api: &CachedApiClient,
  connectivity: Connectivity,
) -> ConnectivityProbe {
  ConnectivityProbe::new(
    api.inner().clone(),
    config.api.health_path.clone(),
    connectivity,
    Duration::from_millis(config.api.probe_interval_ms),
  )
}

async fn run_fetch(
  config: &Config,
  resource: ResourceKey,
  interval: Option<u64>,
  force: bool,
) -> Result<()> {
  let connectivity = Connectivity::new(true);
  let api = CachedApiClient::new(config, connectivity.clone())?;

  let probe = probe_for(config, &api, connectivity);
  probe.check().await;
  let probe_task = probe.spawn();

  let mut monitor = StatsMonitor::spawn(api.cache(), config.cache.stats_interval());
  let stats_task = tokio::spawn(async move {
    while let Some(stats) = monitor.changed().await {
      info!(
        size = stats.size,
        pending = stats.pending_changes,
        online = stats.is_online,
        "cache stats"
      );
    }
  });

  let query = api.query::<Value>(resource);
  let options = FetchOptions {
    force,
    ..FetchOptions::default()
  };

  let result = loop {
    match query.fetch(options.clone()).await {
      FetchOutcome::Loaded(loaded) => {
        info!(resource = %query.resource(), source = ?loaded.source, "resource loaded");
        if let Some(notice) = query.query().error() {
          eprintln!("warning: {}", notice);
        }
        println!("{}", serde_json::to_string_pretty(&loaded.data)?);
      }
      FetchOutcome::Failed(error) => {
        if interval.is_none() {
          break Err(eyre!(error));
        }
        eprintln!("error: {}", error);
      }
      FetchOutcome::Superseded => {}
    }

    let Some(secs) = interval else {
      break Ok(());
    };
    tokio::select! {
      _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
      _ = tokio::signal::ctrl_c() => break Ok(()),
    }
  };

  eprintln!("{}", serde_json::to_string(&api.cache().stats())?);
  probe_task.abort();
  stats_task.abort();
  result
}

async fn run_push(
  config: &Config,
  action: ChangeAction,
  resource: String,
  body: Option<String>,
) -> Result<()> {
  let body: Option<Value> = body
    .map(|raw| serde_json::from_str(&raw))
    .transpose()
    .map_err(|e| eyre!("Invalid JSON body: {}", e))?;

  let connectivity = Connectivity::new(true);
  let api = CachedApiClient::new(config, connectivity.clone())?;
  let mut events = api.cache().subscribe_events();

  let mut changes = OfflineChanges::new(api.cache().clone());
  let change = changes.add_change(action, json!({ "resource": resource, "body": body }));
  if changes.pending_changes().is_empty() {
    return Err(eyre!("Offline mode is disabled in the config, nothing was queued"));
  }
  info!(id = %change.id, "queued change");

  let probe = probe_for(config, &api, connectivity);
  if !probe.check().await {
    return Err(eyre!("API is unreachable, change {} was not sent", change.id));
  }

  let summary = api.cache().sync_pending_changes().await;
  while let Ok(event) = events.try_recv() {
    if let SyncEvent::Dropped { change, error } = event {
      eprintln!("dropped {}: {}", change.id, error);
    }
  }

  if summary.synced == 1 {
    println!("{}", change.id);
    Ok(())
  } else {
    Err(eyre!("Change {} was not applied", change.id))
  }
}
