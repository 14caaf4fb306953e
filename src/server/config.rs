use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::monitoring::executor::{DEFAULT_MAX_RESPONSE_BODY_BYTES, DEFAULT_REQUEST_TIMEOUT};
use crate::monitoring::retry::DEFAULT_MAX_RETRIES;
use crate::monitoring::scheduler::{
    DEFAULT_CHECKS_HISTORY_LIMIT, DEFAULT_TICK_INTERVAL, DEFAULT_TIMEZONE,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{0} is required")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub database_url: String,
    pub listen_addr: String,
    pub log_dir: String,
    pub max_response_body_bytes: usize,
    pub request_timeout_seconds: u64,
    pub max_retries: u32,
    pub tick_interval_seconds: u64,
    pub checks_history_limit: i32,
    pub default_timezone: String,
    pub notification_encryption_key: String,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    database_url: Option<String>,
    listen_addr: Option<String>,
    log_dir: Option<String>,
    max_response_body_bytes: Option<usize>,
    request_timeout_seconds: Option<u64>,
    max_retries: Option<u32>,
    tick_interval_seconds: Option<u64>,
    checks_history_limit: Option<i32>,
    default_timezone: Option<String>,
    notification_encryption_key: Option<String>,
}

fn default_database_url() -> String {
    "sqlite://data/fieldwatch.db?mode=rwc".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let file_config = match config_path {
            Some(path_str) => read_file(Path::new(path_str))?,
            None => PartialServerConfig::default(),
        };
        let env_config: PartialServerConfig = envy::from_env()?;

        Self::merge(env_config, file_config)
    }

    /// Environment wins over file, defaults fill the rest. Zero durations and sizes
    /// fall back to their defaults. The encryption key has no default.
    fn merge(env: PartialServerConfig, file: PartialServerConfig) -> Result<Self, ConfigError> {
        let notification_encryption_key = env
            .notification_encryption_key
            .or(file.notification_encryption_key)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::Missing("NOTIFICATION_ENCRYPTION_KEY"))?;

        Ok(ServerConfig {
            database_url: env
                .database_url
                .or(file.database_url)
                .unwrap_or_else(default_database_url),
            listen_addr: env
                .listen_addr
                .or(file.listen_addr)
                .unwrap_or_else(default_listen_addr),
            log_dir: env.log_dir.or(file.log_dir).unwrap_or_else(default_log_dir),
            max_response_body_bytes: env
                .max_response_body_bytes
                .or(file.max_response_body_bytes)
                .filter(|bytes| *bytes > 0)
                .unwrap_or(DEFAULT_MAX_RESPONSE_BODY_BYTES),
            request_timeout_seconds: env
                .request_timeout_seconds
                .or(file.request_timeout_seconds)
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT.as_secs()),
            max_retries: env
                .max_retries
                .or(file.max_retries)
                .unwrap_or(DEFAULT_MAX_RETRIES),
            tick_interval_seconds: env
                .tick_interval_seconds
                .or(file.tick_interval_seconds)
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_TICK_INTERVAL.as_secs()),
            checks_history_limit: env
                .checks_history_limit
                .or(file.checks_history_limit)
                .unwrap_or(DEFAULT_CHECKS_HISTORY_LIMIT),
            default_timezone: env
                .default_timezone
                .or(file.default_timezone)
                .map(|tz| tz.trim().to_string())
                .filter(|tz| !tz.is_empty())
                .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
            notification_encryption_key,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds)
    }
}

// A missing file is not an error; the process runs on env and defaults.
fn read_file(path: &Path) -> Result<PartialServerConfig, ConfigError> {
    if !path.exists() {
        return Ok(PartialServerConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}
