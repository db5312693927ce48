//! Portal resources and their cache keys.

use color_eyre::{eyre::eyre, Result};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// A cacheable portal API resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceKey {
  /// All organizations visible to the caller
  Organizations,
  /// A single organization
  Organization { org: String },
  /// Members of an organization
  Users { org: String },
  /// Applications configured for an organization
  Apps { org: String },
  /// One page of the audit log
  AuditLogs { org: String, page: u32 },
  /// One page of the security log
  SecurityLogs { org: String, page: u32 },
  /// Available subscription plans
  Plans,
}

impl ResourceKey {
  /// Stable key under which the resource is cached.
  pub fn cache_key(&self) -> String {
    match self {
      Self::Organizations => "organizations".to_string(),
      Self::Organization { org } => format!("organization:{}", org),
      Self::Users { org } => format!("users:{}", org),
      Self::Apps { org } => format!("apps:{}", org),
      Self::AuditLogs { org, page } => format!("audit-logs:{}:{}", org, page),
      Self::SecurityLogs { org, page } => format!("security-logs:{}:{}", org, page),
      Self::Plans => "plans".to_string(),
    }
  }

  /// Path segments relative to the API base URL, not yet encoded.
  pub fn segments(&self) -> Vec<&str> {
    match self {
      Self::Organizations => vec!["organizations"],
      Self::Organization { org } => vec!["organizations", org],
      Self::Users { org } => vec!["organizations", org, "users"],
      Self::Apps { org } => vec!["organizations", org, "apps"],
      Self::AuditLogs { org, .. } => vec!["organizations", org, "audit-logs"],
      Self::SecurityLogs { org, .. } => vec!["organizations", org, "security-logs"],
      Self::Plans => vec!["plans"],
    }
  }

  /// Page number of paginated resources.
  pub fn page(&self) -> Option<u32> {
    match self {
      Self::AuditLogs { page, .. } | Self::SecurityLogs { page, .. } => Some(*page),
      _ => None,
    }
  }

  /// Resolve against `base`. Each segment is percent-encoded, so an
  /// organization id can never add path segments or a query.
  pub fn url(&self, base: &Url) -> Result<Url> {
    let mut url = base.clone();
    url
      .path_segments_mut()
      .map_err(|_| eyre!("API URL {} cannot have a path", base))?
      .pop_if_empty()
      .extend(self.segments());
    if let Some(page) = self.page() {
      url.query_pairs_mut().append_pair("page", &page.to_string());
    }
    Ok(url)
  }
}

impl fmt::Display for ResourceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.cache_key())
  }
}

/// Parses the cache key form, e.g. `users:acme` or `audit-logs:acme:2`.
/// The page defaults to 1 when omitted.
impl FromStr for ResourceKey {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    let mut parts = s.split(':');
    let kind = parts.next().unwrap_or_default();
    let org = parts
      .next()
      .filter(|org| !matches!(*org, "" | "." | ".."))
      .map(str::to_string);
    let page = match parts.next() {
      Some(p) => p
        .parse::<u32>()
        .map_err(|_| format!("invalid page number in {}", s))?,
      None => 1,
    };
    if parts.next().is_some() {
      return Err(format!("too many segments in {}", s));
    }

    let need_org = || org.clone().ok_or_else(|| format!("{} requires an organization", kind));

    match kind {
      "organizations" => Ok(Self::Organizations),
      "plans" => Ok(Self::Plans),
      "organization" => Ok(Self::Organization { org: need_org()? }),
      "users" => Ok(Self::Users { org: need_org()? }),
      "apps" => Ok(Self::Apps { org: need_org()? }),
      "audit-logs" => Ok(Self::AuditLogs {
        org: need_org()?,
        page,
      }),
      "security-logs" => Ok(Self::SecurityLogs {
        org: need_org()?,
        page,
      }),
      other => Err(format!("unknown resource: {}", other)),
    }
  }
}
