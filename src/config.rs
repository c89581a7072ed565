//! Configuration management for finsight.
//!
//! Settings load from a TOML file (default `finsight.toml` in the working
//! directory) with every section optional; environment variables loaded
//! via dotenvy can override the database location and LLM credentials.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::LlmConfig;
use crate::repository::DbContext;

/// Top-level application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub feed: FeedSettings,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("finsight.db")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            queue: QueueSettings::default(),
            worker: WorkerSettings::default(),
            llm: LlmConfig::default(),
            server: ServerSettings::default(),
            feed: FeedSettings::default(),
        }
    }
}

/// Retry, backoff and maintenance policy for the task queue.
///
/// The backoff constants and the health threshold are operational policy,
/// not invariants - tune them per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Retry ceiling applied when enqueue does not specify one.
    pub default_max_retries: u32,
    /// First retry delay in seconds; doubles per attempt.
    pub retry_base_secs: u64,
    /// Retry delay ceiling in seconds.
    pub retry_cap_secs: u64,
    /// Priority demotion applied to each retry so backlogged retries
    /// queue behind fresh work.
    pub retry_priority_penalty: i32,
    /// Delay before re-checking an unsatisfied task dependency, seconds.
    pub dependency_delay_secs: u64,
    /// Processing tasks older than this are considered stuck, minutes.
    pub processing_timeout_mins: u64,
    /// Pending tasks older than this are cancelled as stale, minutes.
    pub pending_timeout_mins: u64,
    /// Days to retain terminal task rows before deletion.
    pub retention_days: i64,
    /// Failure rate (failed / total) above which health is critical.
    pub health_failure_threshold: f64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            default_max_retries: 3,
            retry_base_secs: 30,
            retry_cap_secs: 3600,
            retry_priority_penalty: 10,
            dependency_delay_secs: 180,
            processing_timeout_mins: 60,
            pending_timeout_mins: 24 * 60,
            retention_days: 30,
            health_failure_threshold: 0.2,
        }
    }
}

/// Worker pool sizing and scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Sleep between polls when no task is claimable, milliseconds.
    pub poll_interval_ms: u64,
    /// Hard wall-clock limit per handler invocation, seconds.
    pub handler_timeout_secs: u64,
    /// Loop iterations between maintenance passes (designated worker only).
    pub maintenance_every: u64,
    /// Grace period for in-flight tasks on shutdown, seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval_ms: 500,
            handler_timeout_secs: 120,
            maintenance_every: 120,
            shutdown_grace_secs: 10,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8319,
        }
    }
}

/// News feed ingestion settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    /// JSON feed endpoint to pull insights from.
    pub url: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout_secs: Option<u64>,
}

impl Settings {
    /// Load settings from an explicit path, or `finsight.toml` if present,
    /// falling back to defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let default = PathBuf::from("finsight.toml");
                default.exists().then_some(default)
            }
        };

        let mut settings = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
                toml::from_str(&raw)
                    .map_err(|e| anyhow::anyhow!("invalid config {}: {}", path.display(), e))?
            }
            None => Settings::default(),
        };

        // Environment overrides
        if let Ok(db) = std::env::var("FINSIGHT_DATABASE") {
            settings.database_path = PathBuf::from(db);
        }
        if let Ok(key) = std::env::var("FINSIGHT_LLM_API_KEY") {
            settings.llm.api_key = Some(key);
        }
        if let Ok(endpoint) = std::env::var("FINSIGHT_LLM_ENDPOINT") {
            settings.llm.endpoint = endpoint;
        }

        Ok(settings)
    }

    /// Database URL for migrations.
    pub fn database_url(&self) -> String {
        format!("sqlite:{}", self.database_path.display())
    }

    /// Create a database context for this configuration.
    pub fn create_db_context(&self) -> DbContext {
        DbContext::from_path(&self.database_path)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_secs(self.queue.retry_base_secs)
    }

    pub fn retry_cap(&self) -> Duration {
        Duration::from_secs(self.queue.retry_cap_secs)
    }

    pub fn dependency_delay(&self) -> Duration {
        Duration::from_secs(self.queue.dependency_delay_secs)
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.queue.processing_timeout_mins * 60)
    }

    pub fn pending_timeout(&self) -> Duration {
        Duration::from_secs(self.queue.pending_timeout_mins * 60)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker.poll_interval_ms)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.worker.handler_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.worker.shutdown_grace_secs)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.queue.default_max_retries, 3);
        assert_eq!(settings.queue.retry_base_secs, 30);
        assert_eq!(settings.queue.retry_cap_secs, 3600);
        assert_eq!(settings.worker.workers, 4);
        assert!(settings.queue.health_failure_threshold > 0.0);
    }

    #[test]
    fn test_parse_partial_toml() {
        let raw = r#"
            database_path = "/tmp/news.db"

            [queue]
            default_max_retries = 5

            [worker]
            workers = 2
        "#;
        let settings: Settings = toml::from_str(raw).unwrap();
        assert_eq!(settings.database_path, PathBuf::from("/tmp/news.db"));
        assert_eq!(settings.queue.default_max_retries, 5);
        // Unspecified fields keep defaults
        assert_eq!(settings.queue.retry_priority_penalty, 10);
        assert_eq!(settings.worker.workers, 2);
        assert_eq!(settings.worker.poll_interval_ms, 500);
    }

    #[test]
    fn test_database_url() {
        let settings = Settings {
            database_path: PathBuf::from("/data/finsight.db"),
            ..Default::default()
        };
        assert_eq!(settings.database_url(), "sqlite:/data/finsight.db");
    }
}
