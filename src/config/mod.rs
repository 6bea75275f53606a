//! Configuration management.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `ARXIV_FULLTEXT_*` environment variables (`__` separates section and key).
//!
//! # Configuration File Format
//!
//! ```toml
//! [tasks]
//! backend = "redis"
//! redis_url = "redis://127.0.0.1:6379/0"
//! key_prefix = "arxiv-fulltext:task"
//! ttl_seconds = 3600
//! job_timeout_seconds = 120
//! max_concurrent_jobs = 4
//! sweep_interval_seconds = 300
//!
//! [upstream]
//! min_interval_ms = 3000
//! max_attempts = 3
//! initial_backoff_ms = 1000
//! max_backoff_ms = 8000
//! request_timeout_seconds = 30
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sources::{ARXIV_API_URL, ARXIV_PDF_URL};
use crate::tasks::TaskManagerConfig;
use crate::utils::{RetryConfig, DEFAULT_USER_AGENT};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "ARXIV_FULLTEXT";

/// Longest accepted task TTL (30 days)
pub const MAX_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tasks: TasksConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which task store backs the task manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process memory; tasks are lost on restart
    #[default]
    Memory,
    /// Redis; tasks survive restarts
    Redis,
}

/// Task manager and task store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TasksConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Connection string for the redis backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,

    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,

    #[serde(default = "default_job_timeout")]
    pub job_timeout_seconds: u64,

    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,

    #[serde(default = "default_store_retry_attempts")]
    pub store_retry_attempts: u32,

    #[serde(default = "default_store_retry_initial_ms")]
    pub store_retry_initial_ms: u64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: None,
            key_prefix: default_key_prefix(),
            ttl_seconds: default_ttl(),
            job_timeout_seconds: default_job_timeout(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            sweep_interval_seconds: default_sweep_interval(),
            store_retry_attempts: default_store_retry_attempts(),
            store_retry_initial_ms: default_store_retry_initial_ms(),
        }
    }
}

fn default_key_prefix() -> String {
    "arxiv-fulltext:task".to_string()
}

fn default_ttl() -> u64 {
    3600
}

fn default_job_timeout() -> u64 {
    120
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_store_retry_attempts() -> u32 {
    4
}

fn default_store_retry_initial_ms() -> u64 {
    100
}

/// Remote document service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_pdf_url")]
    pub pdf_url: String,

    /// Minimum spacing between the starts of two outbound requests
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            pdf_url: default_pdf_url(),
            min_interval_ms: default_min_interval(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            request_timeout_seconds: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_api_url() -> String {
    ARXIV_API_URL.to_string()
}

fn default_pdf_url() -> String {
    ARXIV_PDF_URL.to_string()
}

fn default_min_interval() -> u64 {
    3000 // arXiv asks for one request every three seconds
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    8000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Reject settings the task manager cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tasks.backend == StoreBackend::Redis
            && self.tasks.redis_url.as_deref().map_or(true, |url| url.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "tasks.redis_url is required when tasks.backend = \"redis\"".to_string(),
            ));
        }
        if self.tasks.ttl_seconds == 0 || self.tasks.ttl_seconds > MAX_TTL_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "tasks.ttl_seconds must be between 1 and {}",
                MAX_TTL_SECONDS
            )));
        }
        if self.tasks.job_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "tasks.job_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.tasks.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid(
                "tasks.max_concurrent_jobs must be greater than zero".to_string(),
            ));
        }
        if self.upstream.min_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "upstream.min_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn task_manager_config(&self) -> TaskManagerConfig {
        TaskManagerConfig::default()
            .ttl(Duration::from_secs(self.tasks.ttl_seconds))
            .job_timeout(Duration::from_secs(self.tasks.job_timeout_seconds))
            .max_concurrent_jobs(self.tasks.max_concurrent_jobs)
            .store_retry(
                RetryConfig::default()
                    .max_attempts(self.tasks.store_retry_attempts)
                    .initial_delay(Duration::from_millis(self.tasks.store_retry_initial_ms))
                    .max_delay(Duration::from_secs(2)),
            )
    }

    /// Backoff policy for upstream requests
    pub fn upstream_retry(&self) -> RetryConfig {
        RetryConfig::default()
            .max_attempts(self.upstream.max_attempts)
            .initial_delay(Duration::from_millis(self.upstream.initial_backoff_ms))
            .max_delay(Duration::from_millis(self.upstream.max_backoff_ms))
    }

    pub fn rate_interval(&self) -> Duration {
        Duration::from_millis(self.upstream.min_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.request_timeout_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.tasks.sweep_interval_seconds.max(1))
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Serialize error: {0}")]
    Serialize(String),
}

/// `$XDG_CONFIG_HOME/arxiv-fulltext/config.toml` (or the platform equivalent)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("arxiv-fulltext").join("config.toml"))
}

/// Load and validate configuration.
///
/// An explicit `path` must exist; otherwise the default path is used when present.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let file = match path {
        Some(path) => Some((path.to_path_buf(), true)),
        None => default_config_path()
            .filter(|path| path.exists())
            .map(|path| (path, false)),
    };
    build(file, None)
}

fn build(
    file: Option<(PathBuf, bool)>,
    env: Option<HashMap<String, String>>,
) -> Result<Config, ConfigError> {
    let mut builder =
        config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

    if let Some((path, required)) = file {
        tracing::debug!("Loading configuration from {}", path.display());
        builder = builder.add_source(config::File::from(path).required(required));
    }

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(env),
    );

    let config: Config = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}
