//! modsync configuration types and loading

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::coordinator::CoordinatorConfig;

/// Main modsync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Public API location, used for links handed to scorers
    pub api: ApiConfig,

    /// Outbound scoring calls
    pub scoring: ScoringConfig,

    /// Update coordinator
    pub coordinator: CoordinatorConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Log level used when `--log-level` is not given
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Only needed by commands that talk to a scorer.
    pub fn validate(&self) -> Result<()> {
        if self.scoring.get_auth().is_none() {
            return Err(eyre::eyre!(
                "Scoring auth token not found. Set scoring.auth or the {} environment variable.",
                self.scoring.auth_env
            ));
        }
        Ok(())
    }

    /// Load configuration
    ///
    /// An explicit path must load. Otherwise the first readable file from
    /// [`search_paths`](Self::search_paths) wins, and defaults are used when
    /// there is none.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        debug!(?config_path, "Config::load: called");
        if let Some(path) = config_path {
            return Self::load_from_file(path).wrap_err_with(|| format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::search_paths() {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => warn!(path = %candidate.display(), error = %e, "Skipping unreadable config"),
            }
        }

        debug!("Config::load: no config file found, using defaults");
        Ok(Self::default())
    }

    /// Implicit config locations, most specific first
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".modsync.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("modsync").join("modsync.yml"));
        }
        paths
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Config::load_from_file: called");
        let content = fs::read_to_string(path).wrap_err("Failed to read config file")?;
        let config = serde_yaml::from_str(&content).wrap_err("Failed to parse config file")?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }
}

/// Public API location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the moderator API
    pub url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
        }
    }
}

impl ApiConfig {
    /// Base URL with trailing slashes removed
    pub fn api_url(&self) -> String {
        self.url.trim_end_matches('/').to_string()
    }
}

/// Outbound scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Token sent as the `Authorization` header, takes precedence over `auth-env`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,

    /// Environment variable containing the token
    #[serde(rename = "auth-env")]
    pub auth_env: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            auth: None,
            auth_env: "GOOGLE_SCORE_AUTH".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl ScoringConfig {
    /// Resolve the scoring token: inline value first, then the environment
    pub fn get_auth(&self) -> Option<String> {
        if let Some(auth) = self.auth.as_ref().filter(|a| !a.is_empty()) {
            return Some(auth.clone());
        }
        std::env::var(&self.auth_env).ok().filter(|a| !a.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database holding the counter and content tables
    #[serde(rename = "database-path")]
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/modsync on Linux)
        let database_path = dirs::data_dir()
            .map(|d| d.join("modsync").join("modsync.db"))
            .unwrap_or_else(|| PathBuf::from(".modsync/modsync.db"));
        Self { database_path }
    }
}
