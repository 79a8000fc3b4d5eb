use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub remote: RemoteConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

/// Connection settings for the remote document store.
///
/// Remote mode is only enabled when every secret is present.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  #[serde(default)]
  pub api_key: String,
  #[serde(default)]
  pub project_id: String,
  #[serde(default)]
  pub auth_domain: String,
  #[serde(default)]
  pub app_id: String,
  /// Base URL of the REST API
  #[serde(default = "default_endpoint")]
  pub endpoint: String,
  #[serde(default = "default_database")]
  pub database: String,
}

fn default_endpoint() -> String {
  "https://firestore.googleapis.com/v1".to_string()
}

fn default_database() -> String {
  "(default)".to_string()
}

impl Default for RemoteConfig {
  fn default() -> Self {
    Self {
      api_key: String::new(),
      project_id: String::new(),
      auth_domain: String::new(),
      app_id: String::new(),
      endpoint: default_endpoint(),
      database: default_database(),
    }
  }
}

impl RemoteConfig {
  /// Whether all required secrets are non-empty.
  pub fn is_complete(&self) -> bool {
    [&self.api_key, &self.project_id, &self.auth_domain, &self.app_id]
      .iter()
      .all(|s| !s.trim().is_empty())
  }

  /// Override secrets from environment variables.
  ///
  /// Reads OPSDESK_API_KEY, OPSDESK_PROJECT_ID, OPSDESK_AUTH_DOMAIN and
  /// OPSDESK_APP_ID. Unset or empty variables leave the file value alone.
  pub fn apply_env(&mut self) {
    let overrides = [
      ("OPSDESK_API_KEY", &mut self.api_key),
      ("OPSDESK_PROJECT_ID", &mut self.project_id),
      ("OPSDESK_AUTH_DOMAIN", &mut self.auth_domain),
      ("OPSDESK_APP_ID", &mut self.app_id),
    ];
    for (var, slot) in overrides {
      if let Ok(value) = std::env::var(var) {
        if !value.is_empty() {
          *slot = value;
        }
      }
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  /// SQLite file (defaults to $XDG_DATA_HOME/opsdesk/cache.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// How often standing watches re-query a store without push support
  #[serde(default = "default_poll_interval_ms")]
  pub poll_interval_ms: u64,
  /// Upper bound on any single remote call
  #[serde(default = "default_remote_timeout_ms")]
  pub remote_timeout_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
  5_000
}

fn default_remote_timeout_ms() -> u64 {
  10_000
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      poll_interval_ms: default_poll_interval_ms(),
      remote_timeout_ms: default_remote_timeout_ms(),
    }
  }
}

impl SyncConfig {
  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.poll_interval_ms.max(1))
  }

  pub fn remote_timeout(&self) -> Duration {
    Duration::from_millis(self.remote_timeout_ms.max(1))
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
  /// Directory for daily-rolling log files; stderr only when unset
  pub dir: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./opsdesk.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/opsdesk/config.yaml
  ///
  /// With no file found the defaults apply, which means cache-only mode
  /// unless the secrets come from the environment.
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
    config.remote.apply_env();

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("opsdesk.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("opsdesk").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(contents)?)
  }
}
