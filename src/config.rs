use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheOptions;

/// Base URL used when none is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Environment variable overriding `api_url`.
pub const API_URL_ENV: &str = "DOMAIN_SYNC_API_URL";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Service base URL; normalized to end in `/api`
  pub api_url: Option<String>,
  /// Domains per page when the caller doesn't pick a limit
  pub page_size: u32,
  /// Automatic retries for a failed page fetch (mutations never retry)
  pub retry: u32,
  pub retry_delay_ms: u64,
  pub toast_timeout_ms: u64,
  /// Retention of cache entries nobody is watching
  pub gc_time_secs: u64,
  /// Per-request timeout. Unset means requests are never cut short locally.
  pub request_timeout_secs: Option<u64>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      api_url: None,
      page_size: 25,
      retry: 1,
      retry_delay_ms: 1000,
      toast_timeout_ms: 4000,
      gc_time_secs: 300,
      request_timeout_secs: None,
    }
  }
}

impl Config {
  /// Load configuration from file, falling back to defaults.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./domain-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/domain-sync/config.yaml
  ///
  /// `DOMAIN_SYNC_API_URL` overrides the file's `api_url`.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    if let Ok(url) = std::env::var(API_URL_ENV) {
      config.api_url = Some(url);
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("domain-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("domain-sync").join("config.yaml");
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

  fn parse(contents: &str) -> Result<Self> {
    // An empty file is a valid "all defaults" config
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    Ok(serde_yaml::from_str(contents)?)
  }

  fn validate(&self) -> Result<()> {
    if self.page_size == 0 {
      return Err(eyre!("page_size must be greater than zero"));
    }
    Ok(())
  }

  /// Normalized service base URL.
  pub fn api_url(&self) -> String {
    normalize_api_url(self.api_url.as_deref())
  }

  pub fn cache_options(&self) -> CacheOptions {
    CacheOptions {
      retry: self.retry,
      retry_delay: Duration::from_millis(self.retry_delay_ms),
      gc_time: Duration::from_secs(self.gc_time_secs),
    }
  }

  pub fn toast_timeout(&self) -> Duration {
    Duration::from_millis(self.toast_timeout_ms)
  }

  pub fn request_timeout(&self) -> Option<Duration> {
    self.request_timeout_secs.map(Duration::from_secs)
  }
}

/// Strip trailing slashes and make sure the URL ends in a single `/api`.
pub fn normalize_api_url(raw: Option<&str>) -> String {
  let clean = match raw.map(str::trim) {
    Some(url) if !url.is_empty() => url.trim_end_matches('/'),
    _ => return DEFAULT_API_URL.to_string(),
  };

  if clean.ends_with("/api") {
    clean.to_string()
  } else {
    format!("{}/api", clean)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_normalize_api_url() {
    assert_eq!(normalize_api_url(None), DEFAULT_API_URL);
    assert_eq!(normalize_api_url(Some("  ")), DEFAULT_API_URL);
    assert_eq!(
      normalize_api_url(Some("https://inventory.example.com")),
      "https://inventory.example.com/api"
    );
    assert_eq!(
      normalize_api_url(Some("https://inventory.example.com///")),
      "https://inventory.example.com/api"
    );
    assert_eq!(
      normalize_api_url(Some("https://inventory.example.com/api/")),
      "https://inventory.example.com/api"
    );
  }

  #[test]
  fn test_normalize_is_idempotent() {
    for raw in ["http://a", "http://a/", "http://a/api", "http://a/api//", "http://a/v1"] {
      let once = normalize_api_url(Some(raw));
      assert_eq!(normalize_api_url(Some(&once)), once);
    }
  }

  #[test]
  fn test_parse_partial_config() {
    let config = Config::parse("api_url: http://10.0.0.5:8000\npage_size: 50\n").unwrap();
    assert_eq!(config.api_url(), "http://10.0.0.5:8000/api");
    assert_eq!(config.page_size, 50);
    assert_eq!(config.retry, 1);
    assert_eq!(config.toast_timeout(), Duration::from_secs(4));
  }

  #[test]
  fn test_parse_empty_config() {
    let config = Config::parse("").unwrap();
    assert_eq!(config.api_url(), DEFAULT_API_URL);
    assert_eq!(config.cache_options().retry, 1);
    assert_eq!(config.request_timeout(), None);
  }

  #[test]
  fn test_parse_request_timeout() {
    let config = Config::parse("request_timeout_secs: 15").unwrap();
    assert_eq!(config.request_timeout(), Some(Duration::from_secs(15)));
  }

  #[test]
  fn test_validate_rejects_zero_page_size() {
    let config = Config::parse("page_size: 0").unwrap();
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_missing_explicit_path() {
    let err = Config::load(Some(Path::new("/nonexistent/domain-sync.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
