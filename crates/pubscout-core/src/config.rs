//! PubScout configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, ScoutError};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoutConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub writer: WriterConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl ScoutConfig {
    /// Load config from `PUBSCOUT_CONFIG` or the default path; missing file = defaults.
    pub fn load() -> Result<Self> {
        let path = std::env::var("PUBSCOUT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path());
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ScoutError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ScoutError::Config(format!("Failed to parse config: {e}")))
    }

    /// Secrets from the environment win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("PUBSCOUT_API_KEY") {
            self.gateway.api_key = key;
        }
        if let Ok(key) = std::env::var("WRITER_AGENT_API_KEY") {
            self.writer.api_key = key;
        }
        if let Ok(key) = std::env::var("DISCOVERY_API_KEY") {
            self.discovery.api_key = key;
        }
    }

    /// Get the default config path (~/.pubscout/config.toml).
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the PubScout home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pubscout")
    }
}

/// SQLite database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.pubscout/pubscout.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

/// Periodic scan trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
}

fn default_tick_interval() -> u64 { 3600 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_interval_secs: default_tick_interval() }
    }
}

/// In-process queue and consumer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_batch_size() -> usize { 10 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_delay() -> u64 { 30 }
fn default_poll_interval() -> u64 { 1000 }

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

/// Bounded backoff for individual store operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 { 3 }
fn default_base_delay() -> u64 { 200 }
fn default_max_delay() -> u64 { 5000 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

/// Local workflow engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_workflow_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_workflow_backoff")]
    pub retry_backoff_secs: u64,
}

fn default_workflow_attempts() -> u32 { 2 }
fn default_workflow_backoff() -> u64 { 60 }

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_workflow_attempts(),
            retry_backoff_secs: default_workflow_backoff(),
        }
    }
}

/// Manual trigger HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bearer token for `/api/*`. Empty = every API call is rejected.
    #[serde(default)]
    pub api_key: String,
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8787 }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: String::new(),
        }
    }
}

/// Writing/publishing service endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    #[serde(default = "default_writer_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Autonomous writing is slow; keep this generous.
    #[serde(default = "default_writer_timeout")]
    pub timeout_secs: u64,
}

fn default_writer_url() -> String { "http://127.0.0.1:8788".into() }
fn default_writer_timeout() -> u64 { 600 }

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            base_url: default_writer_url(),
            api_key: String::new(),
            timeout_secs: default_writer_timeout(),
        }
    }
}

/// Discovery backend endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_discovery_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_discovery_timeout")]
    pub timeout_secs: u64,
}

fn default_discovery_url() -> String { "http://127.0.0.1:8789/api/discover".into() }
fn default_discovery_timeout() -> u64 { 300 }

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            url: default_discovery_url(),
            api_key: String::new(),
            timeout_secs: default_discovery_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScoutConfig::default();
        assert_eq!(config.scheduler.tick_interval_secs, 3600);
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.gateway.api_key.is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ScoutConfig::from_toml(
            r#"
            [scheduler]
            tick_interval_secs = 60

            [gateway]
            port = 9000
            api_key = "secret"
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.tick_interval_secs, 60);
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.gateway.api_key, "secret");
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.queue.batch_size, 10);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = ScoutConfig::from_toml("[scheduler\n").unwrap_err();
        assert!(matches!(err, ScoutError::Config(_)));
    }
}
