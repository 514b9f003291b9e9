//! Configuration for meridian-control.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{EngineError, EngineResult};

/// Top-level configuration for the orchestration engine.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Scheduler client configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Deployment behaviour configuration.
    #[serde(default)]
    pub deployment: DeploymentConfig,
}

impl EngineConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override
    /// earlier):
    /// 1. Default values
    /// 2. `meridian.toml` in the current directory (if present)
    /// 3. Environment variables with `MERIDIAN_` prefix
    pub fn load() -> EngineResult<Self> {
        Figment::new()
            .merge(Toml::file("meridian.toml"))
            .merge(Env::prefixed("MERIDIAN_").split("__"))
            .extract()
            .map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> EngineResult<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("MERIDIAN_").split("__"))
            .extract()
            .map_err(|e| EngineError::Config(e.to_string()))
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_database_url() -> String {
    "postgres://localhost/meridian".to_owned()
}

const fn default_max_connections() -> u32 {
    10
}

const fn default_connect_timeout_secs() -> u64 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Scheduler client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Base URL for the scheduler HTTP API.
    #[serde(default = "default_scheduler_url")]
    pub url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_scheduler_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_scheduler_url() -> String {
    "http://localhost:8082".to_owned()
}

const fn default_scheduler_timeout_secs() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            url: default_scheduler_url(),
            timeout_secs: default_scheduler_timeout_secs(),
        }
    }
}

/// Deployment behaviour configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentConfig {
    /// Capacity of each deploy's progress event buffer.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Timeout for a whole deploy operation in seconds.
    #[serde(default = "default_deploy_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_event_buffer() -> usize {
    256
}

const fn default_deploy_timeout_secs() -> u64 {
    600
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
            timeout_secs: default_deploy_timeout_secs(),
        }
    }
}
