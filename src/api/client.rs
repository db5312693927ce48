use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::resource::ResourceKey;
use crate::config::{ApiConfig, Config};
use crate::offline::{ChangeAction, PendingChange};

/// Payload carried by a pending change bound for the REST API.
///
/// ```json
/// { "resource": "organizations/acme/users/42", "body": { "role": "admin" } }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChangePayload {
  /// Path relative to the API base URL
  pub resource: String,
  #[serde(default)]
  pub body: Option<Value>,
}

/// Portal REST API client wrapper
#[derive(Clone, Debug)]
pub struct ApiClient {
  http: reqwest::Client,
  base: Url,
  token: Option<String>,
}

impl ApiClient {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_millis(config.timeout_ms))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Self::with_http(http, &config.url, Config::get_api_token())
  }

  pub fn with_http(http: reqwest::Client, base_url: &str, token: Option<String>) -> Result<Self> {
    let base = parse_base_url(base_url)?;
    Ok(Self { http, base, token })
  }

  pub fn base_url(&self) -> &Url {
    &self.base
  }

  /// Resolve `path` against the base URL.
  pub fn endpoint(&self, path: &str) -> Result<Url> {
    self
      .base
      .join(path.trim_start_matches('/'))
      .map_err(|e| eyre!("Invalid API path {}: {}", path, e))
  }

  fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder> {
    let url = self.endpoint(path)?;
    Ok(self.request_url(method, url))
  }

  fn request_url(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
    let builder = self.http.request(method, url);
    match &self.token {
      Some(token) => builder.bearer_auth(token),
      None => builder,
    }
  }

  /// GET `path` and decode the JSON body.
  pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
    let url = self.endpoint(path)?;
    self.fetch_json(url, path).await
  }

  /// GET a portal resource and decode the JSON body.
  pub async fn get_resource<T: DeserializeOwned>(&self, resource: &ResourceKey) -> Result<T> {
    let url = resource.url(&self.base)?;
    self.fetch_json(url, &resource.to_string()).await
  }

  async fn fetch_json<T: DeserializeOwned>(&self, url: Url, label: &str) -> Result<T> {
    let response = self
      .request_url(Method::GET, url)
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", label, e))?
      .error_for_status()
      .map_err(|e| eyre!("Failed to fetch {}: {}", label, e))?;

    response
      .json::<T>()
      .await
      .map_err(|e| eyre!("Failed to parse response from {}: {}", label, e))
  }

  /// Send a write request, discarding the response body.
  pub async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<()> {
    let mut request = self.request(method.clone(), path)?;
    if let Some(body) = body {
      request = request.json(body);
    }

    request
      .send()
      .await
      .map_err(|e| eyre!("Failed to {} {}: {}", method, path, e))?
      .error_for_status()
      .map_err(|e| eyre!("Failed to {} {}: {}", method, path, e))?;

    Ok(())
  }

  /// Replay a pending change: create -> POST, update -> PUT, delete -> DELETE.
  pub async fn send_change(&self, change: &PendingChange) -> Result<()> {
    let payload: ChangePayload = serde_json::from_value(change.data.clone())
      .map_err(|e| eyre!("Pending change {} has no valid payload: {}", change.id, e))?;

    let method = method_for(change.action);
    self
      .send(method, &payload.resource, payload.body.as_ref())
      .await
  }

  /// Whether the health endpoint answers with a success status.
  pub async fn check_health(&self, path: &str) -> bool {
    let request = match self.request(Method::GET, path) {
      Ok(request) => request,
      Err(_) => return false,
    };
    match request.send().await {
      Ok(response) => response.status().is_success(),
      Err(_) => false,
    }
  }
}

fn method_for(action: ChangeAction) -> Method {
  match action {
    ChangeAction::Create => Method::POST,
    ChangeAction::Update => Method::PUT,
    ChangeAction::Delete => Method::DELETE,
  }
}

/// Parse the base URL, making sure it ends in `/` so relative joins append
/// instead of replacing the last segment.
fn parse_base_url(raw: &str) -> Result<Url> {
  let normalized = if raw.ends_with('/') {
    raw.to_string()
  } else {
    format!("{}/", raw)
  };
  Url::parse(&normalized).map_err(|e| eyre!("Invalid API URL {}: {}", raw, e))
}
