//! Configuration loading for the activity tracker.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `TRACKER_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connectors::github::{DEFAULT_API_BASE, GitHubApiConfig};
use crate::ingest::RetentionPolicy;

const ENV_PREFIX: &str = "TRACKER_";

/// Shortest accepted background ingestion interval when enabled.
pub const MIN_INGEST_INTERVAL_SECONDS: u64 = 60;

/// Application configuration derived from `TRACKER_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_repositories_path")]
    pub repositories_path: PathBuf,
    #[serde(default = "default_events_path")]
    pub events_path: PathBuf,
    /// Rolling retention window in days
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    /// Maximum stored events per repository
    #[serde(default = "default_max_events")]
    pub max_events: usize,
    #[serde(default = "default_github_api_base")]
    pub github_api_base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
    /// Background ingestion period; 0 disables the scheduler
    #[serde(default)]
    pub ingest_interval_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            repositories_path: default_repositories_path(),
            events_path: default_events_path(),
            window_days: default_window_days(),
            max_events: default_max_events(),
            github_api_base: default_github_api_base(),
            github_token: None,
            ingest_interval_seconds: 0,
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.github_token.is_some() {
            config.github_token = Some("[REDACTED]".to_string());
        }
        serde_json::to_string_pretty(&config)
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.window_days, self.max_events)
    }

    pub fn github_api(&self) -> GitHubApiConfig {
        GitHubApiConfig {
            base_url: self.github_api_base.clone(),
            token: self.github_token.clone(),
        }
    }

    /// Validates value ranges and the formats of addresses and URLs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_days < 1 {
            return Err(ConfigError::InvalidWindowDays {
                value: self.window_days,
            });
        }

        if self.max_events < 1 {
            return Err(ConfigError::InvalidMaxEvents {
                value: self.max_events,
            });
        }

        if self.repositories_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyStoragePath {
                key: "REPOSITORIES_PATH",
            });
        }
        if self.events_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyStoragePath { key: "EVENTS_PATH" });
        }

        if let Err(source) = url::Url::parse(&self.github_api_base) {
            return Err(ConfigError::InvalidApiBase {
                value: self.github_api_base.clone(),
                source,
            });
        }

        if self.ingest_interval_seconds != 0
            && self.ingest_interval_seconds < MIN_INGEST_INTERVAL_SECONDS
        {
            return Err(ConfigError::InvalidIngestInterval {
                value: self.ingest_interval_seconds,
            });
        }

        if let Err(source) = self.bind_addr() {
            return Err(ConfigError::InvalidBindAddr {
                value: self.api_bind_addr.clone(),
                source,
            });
        }

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_repositories_path() -> PathBuf {
    PathBuf::from("data/repositories.json")
}

fn default_events_path() -> PathBuf {
    PathBuf::from("data/events.json")
}

fn default_window_days() -> u32 {
    7
}

fn default_max_events() -> usize {
    500
}

fn default_github_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("{key} must be a non-negative integer, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },
    #[error("retention window must be at least 1 day, got {value}")]
    InvalidWindowDays { value: u32 },
    #[error("maximum stored events must be at least 1, got {value}")]
    InvalidMaxEvents { value: usize },
    #[error("{key} must not be empty")]
    EmptyStoragePath { key: &'static str },
    #[error("invalid GitHub API base '{value}': {source}")]
    InvalidApiBase {
        value: String,
        source: url::ParseError,
    },
    #[error("ingest interval must be 0 (disabled) or at least 60 seconds, got {value}")]
    InvalidIngestInterval { value: u64 },
}

/// Loads configuration using layered `.env` files and `TRACKER_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads and validates the configuration.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let api_bind_addr = layered
            .remove("API_BIND_ADDR")
            .unwrap_or_else(default_api_bind_addr);
        let log_level = layered
            .remove("LOG_LEVEL")
            .unwrap_or_else(default_log_level);
        let log_format = layered
            .remove("LOG_FORMAT")
            .map(|v| v.to_lowercase())
            .unwrap_or_else(default_log_format);
        let repositories_path = layered
            .remove("REPOSITORIES_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_repositories_path);
        let events_path = layered
            .remove("EVENTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_events_path);
        let window_days = parse_number(&mut layered, "WINDOW_DAYS")?.unwrap_or_else(default_window_days);
        let max_events = parse_number(&mut layered, "MAX_EVENTS")?.unwrap_or_else(default_max_events);
        let github_api_base = layered
            .remove("GITHUB_API_BASE")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_github_api_base);
        let github_token = layered
            .remove("GITHUB_TOKEN")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let ingest_interval_seconds =
            parse_number(&mut layered, "INGEST_INTERVAL_SECONDS")?.unwrap_or(0);

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            repositories_path,
            events_path,
            window_days,
            max_events,
            github_api_base,
            github_token,
            ingest_interval_seconds,
        };

        config.validate()?;
        Ok(config)
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Blank values count as unset.
fn parse_number<T: FromStr>(
    layered: &mut BTreeMap<String, String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match layered.remove(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        _ => Ok(None),
    }
}
