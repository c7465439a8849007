use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::{ClientOptions, Headers};
use crate::storage::FileStore;

/// Environment variable overriding `api.base_url`.
pub const BASE_URL_ENV: &str = "PDCS_API_BASE_URL";
/// Environment variable holding a bearer token for the API client.
pub const TOKEN_ENV: &str = "PDCS_API_TOKEN";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiSettings,
  #[serde(default)]
  pub database: DatabaseSettings,
  /// Bearer token from the environment, never read from the file.
  #[serde(skip)]
  pub api_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
  pub base_url: String,
  pub timeout_ms: u64,
  pub retry: u32,
  pub retry_delay_ms: u64,
  pub cache_ttl_ms: u64,
  /// How often expired cache entries are swept
  pub cache_sweep_interval_ms: u64,
  /// Extra default headers sent with every request
  pub headers: BTreeMap<String, String>,
}

impl Default for ApiSettings {
  fn default() -> Self {
    let defaults = ClientOptions::default();
    Self {
      base_url: "http://localhost:3000/api/".to_string(),
      timeout_ms: defaults.timeout.as_millis() as u64,
      retry: defaults.retry,
      retry_delay_ms: defaults.retry_delay.as_millis() as u64,
      cache_ttl_ms: defaults.cache_ttl.as_millis() as u64,
      cache_sweep_interval_ms: 5 * 60 * 1000,
      headers: BTreeMap::new(),
    }
  }
}

impl ApiSettings {
  pub fn client_options(&self) -> ClientOptions {
    ClientOptions {
      timeout: Duration::from_millis(self.timeout_ms),
      retry: self.retry,
      retry_delay: Duration::from_millis(self.retry_delay_ms),
      cache_ttl: Duration::from_millis(self.cache_ttl_ms),
    }
  }

  pub fn sweep_interval(&self) -> Duration {
    Duration::from_millis(self.cache_sweep_interval_ms)
  }

  pub fn default_headers(&self) -> Headers {
    self
      .headers
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect()
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseSettings {
  /// Directory for the snapshot and other persisted keys
  /// (defaults to <data_dir>/pdcs/storage)
  pub storage_dir: Option<PathBuf>,
}

impl DatabaseSettings {
  pub fn storage_dir(&self) -> Result<PathBuf> {
    match &self.storage_dir {
      Some(dir) => Ok(dir.clone()),
      None => FileStore::default_dir().ok_or_else(|| eyre!("Could not determine data directory")),
    }
  }
}

impl Config {
  /// Load configuration from file, then apply environment overrides.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./pdcs.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/pdcs/config.yaml
  ///
  /// Defaults are used when no file is found.
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
    config.apply_overrides(|name| std::env::var(name).ok());
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("pdcs.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("pdcs").join("config.yaml");
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

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    // An empty file deserializes as null.
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Apply `PDCS_API_BASE_URL` and `PDCS_API_TOKEN` as looked up by `lookup`.
  pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup(BASE_URL_ENV).filter(|v| !v.is_empty()) {
      self.api.base_url = url;
    }
    if let Some(token) = lookup(TOKEN_ENV).filter(|v| !v.is_empty()) {
      self.api_token = Some(token);
    }
  }
}
