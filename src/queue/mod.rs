//! Persistent task queue over the embedded database.
//!
//! `TaskQueue` is the transactional API for the claim/complete/fail
//! lifecycle. It owns the retry/backoff policy, the entity status cascade
//! on permanent failure, and the maintenance paths that recover stuck,
//! stale, and orphaned tasks. Handlers and workers never write task status
//! directly - every transition goes through this type.

pub mod handlers;
mod worker;
mod worker_pool;

pub use worker::{Worker, WorkerConfig};
pub use worker_pool::{WorkerPool, WorkerPoolConfig};

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::models::{
    HealthStatus, InsightStatus, QueueHealth, Task, TaskPayload, TaskStats, TaskStatus,
    ENTITY_INSIGHT,
};
use crate::repository::util::is_busy_error;
use crate::repository::{DieselError, InsightRepository, TaskStore};

const CANCEL_ALL_REASON: &str = "bulk cancel requested";
const STALE_PENDING_REASON: &str = "pending timeout exceeded";
const ORPHAN_REASON: &str = "referenced insight no longer exists";

/// Retry, backoff and maintenance policy.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub default_max_retries: u32,
    pub retry_base: Duration,
    pub retry_cap: Duration,
    /// Subtracted from priority on each retry so retries queue behind
    /// fresh work.
    pub retry_priority_penalty: i32,
    pub processing_timeout: Duration,
    pub pending_timeout: Duration,
    pub retention_days: i64,
    pub health_failure_threshold: f64,
    /// Transparent retries for SQLite lock contention.
    pub busy_attempts: u32,
    pub busy_base: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_max_retries: 3,
            retry_base: Duration::from_secs(30),
            retry_cap: Duration::from_secs(3600),
            retry_priority_penalty: 10,
            processing_timeout: Duration::from_secs(3600),
            pending_timeout: Duration::from_secs(24 * 3600),
            retention_days: 30,
            health_failure_threshold: 0.2,
            busy_attempts: 5,
            busy_base: Duration::from_millis(50),
        }
    }
}

impl QueueConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            default_max_retries: settings.queue.default_max_retries,
            retry_base: settings.retry_base(),
            retry_cap: settings.retry_cap(),
            retry_priority_penalty: settings.queue.retry_priority_penalty,
            processing_timeout: settings.processing_timeout(),
            pending_timeout: settings.pending_timeout(),
            retention_days: settings.queue.retention_days,
            health_failure_threshold: settings.queue.health_failure_threshold,
            ..Default::default()
        }
    }
}

/// Optional parameters for [`TaskQueue::enqueue`].
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Override the configured retry ceiling.
    pub max_retries: Option<u32>,
    /// Higher claims first. Fresh work defaults to 0.
    pub priority: i32,
    /// Entity back-reference for status cascades and orphan detection.
    pub entity: Option<(String, i32)>,
}

impl EnqueueOptions {
    /// Options linking the task to an insight.
    pub fn for_insight(insight_id: i32) -> Self {
        Self {
            entity: Some((ENTITY_INSIGHT.to_string(), insight_id)),
            ..Default::default()
        }
    }
}

/// Retry lock-contention errors with short exponential backoff, invisibly
/// to callers. Anything that isn't a busy error propagates immediately.
macro_rules! busy_retry {
    ($config:expr, $body:expr) => {{
        let mut attempt: u32 = 0;
        loop {
            match $body {
                Err(ref e) if is_busy_error(e) && attempt < $config.busy_attempts => {
                    attempt += 1;
                    let delay = $config.busy_base * 2u32.saturating_pow(attempt - 1);
                    tokio::time::sleep(delay).await;
                }
                other => break other,
            }
        }
    }};
}

/// Transactional task queue shared by all workers and triggers.
pub struct TaskQueue {
    store: TaskStore,
    insights: InsightRepository,
    config: QueueConfig,
}

impl TaskQueue {
    pub fn new(store: TaskStore, insights: InsightRepository, config: QueueConfig) -> Self {
        Self {
            store,
            insights,
            config,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Create a pending task. Returns the new task id.
    pub async fn enqueue(
        &self,
        payload: TaskPayload,
        opts: EnqueueOptions,
    ) -> Result<String, DieselError> {
        let (entity_type, entity_id) = match opts.entity {
            Some((t, id)) => (Some(t), Some(id)),
            None => (None, None),
        };

        let task = Task {
            id: Uuid::new_v4().to_string(),
            task_type: payload.task_type().to_string(),
            payload: payload.to_value(),
            status: TaskStatus::Pending,
            retries: 0,
            max_retries: opts.max_retries.unwrap_or(self.config.default_max_retries),
            priority: opts.priority,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            next_retry_at: None,
            result: None,
            error: None,
            entity_type,
            entity_id,
        };

        busy_retry!(self.config, self.store.insert(&task).await)?;
        debug!(task_id = %task.id, task_type = %task.task_type, "enqueued task");
        Ok(task.id)
    }

    /// Atomically claim the next eligible pending task, if any.
    ///
    /// At most one caller observes any given task; racing claimers see it
    /// as already gone. Callers are expected to back off when this
    /// returns `None`.
    pub async fn claim_next(&self) -> Result<Option<Task>, DieselError> {
        busy_retry!(self.config, self.store.claim_next().await)
    }

    /// Look up a task by id (dependency checks, introspection).
    pub async fn get_task(&self, id: &str) -> Result<Option<Task>, DieselError> {
        self.store.get(id).await
    }

    /// Record successful completion. Idempotent: a task that is no longer
    /// in processing is left untouched.
    pub async fn complete(
        &self,
        id: &str,
        result: Option<serde_json::Value>,
    ) -> Result<(), DieselError> {
        let updated = busy_retry!(self.config, self.store.mark_completed(id, result.as_ref()).await)?;
        if updated {
            debug!(task_id = %id, "task completed");
        } else {
            debug!(task_id = %id, "complete on non-processing task ignored");
        }
        Ok(())
    }

    /// Record a failure.
    ///
    /// Non-permanent failures with retry budget left go back to pending:
    /// retries incremented, priority demoted, started_at cleared, and the
    /// backoff gate pushed out exponentially. Otherwise the task is
    /// terminally failed and an insight back-reference has its status
    /// cascaded to failed.
    pub async fn fail(&self, id: &str, error: &str, permanent: bool) -> Result<(), DieselError> {
        let Some(task) = self.store.get(id).await? else {
            warn!(task_id = %id, "fail() on unknown task");
            return Ok(());
        };
        if task.status != TaskStatus::Processing {
            debug!(task_id = %id, status = task.status.as_str(), "fail on non-processing task ignored");
            return Ok(());
        }

        if !permanent && task.retries < task.max_retries {
            let retries = task.retries + 1;
            let delay = self.retry_delay(retries);
            let next_retry_at = Utc::now() + chrono::Duration::seconds(delay.as_secs() as i64);
            let priority = task.priority - self.config.retry_priority_penalty;

            busy_retry!(
                self.config,
                self.store
                    .reschedule(id, retries, priority, next_retry_at, error)
                    .await
            )?;
            info!(
                task_id = %id,
                retries,
                max_retries = task.max_retries,
                delay_secs = delay.as_secs(),
                "task failed, scheduled for retry: {}", error
            );
            return Ok(());
        }

        busy_retry!(self.config, self.store.mark_failed(id, error).await)?;
        warn!(task_id = %id, retries = task.retries, "task failed permanently: {}", error);

        if task.entity_type.as_deref() == Some(ENTITY_INSIGHT) {
            if let Some(entity_id) = task.entity_id {
                if let Err(e) = self
                    .insights
                    .update_status(entity_id, InsightStatus::Failed)
                    .await
                {
                    warn!(insight_id = entity_id, "status cascade failed: {}", e);
                }
            }
        }
        Ok(())
    }

    /// Reschedule a task whose dependency is not ready yet. Does not touch
    /// retry accounting - waiting on a dependency is not a failure.
    pub async fn postpone(&self, id: &str, delay: Duration) -> Result<(), DieselError> {
        let next_retry_at = Utc::now() + chrono::Duration::seconds(delay.as_secs() as i64);
        let updated = busy_retry!(self.config, self.store.postpone(id, next_retry_at).await)?;
        if updated {
            debug!(task_id = %id, delay_secs = delay.as_secs(), "task postponed");
        }
        Ok(())
    }

    /// Exponential retry delay for the given attempt count, capped.
    fn retry_delay(&self, retries: u32) -> Duration {
        let exp = retries.saturating_sub(1).min(16);
        let secs = self
            .config
            .retry_base
            .as_secs()
            .saturating_mul(1u64 << exp);
        Duration::from_secs(secs.min(self.config.retry_cap.as_secs()))
    }

    /// Cancel every pending and processing task. Returns the count.
    pub async fn cancel_all(&self) -> Result<usize, DieselError> {
        let count = busy_retry!(self.config, self.store.cancel_active(CANCEL_ALL_REASON).await)?;
        if count > 0 {
            info!(count, "cancelled all active tasks");
        }
        Ok(count)
    }

    /// Recover processing tasks whose worker died without reporting back.
    ///
    /// Each stuck task is either rescheduled (budget remains) or failed
    /// (budget exhausted), through the normal failure path.
    pub async fn reset_stuck(&self, timeout: Duration) -> Result<usize, DieselError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(timeout.as_secs() as i64);
        let stuck = self.store.stale_processing(cutoff).await?;
        let count = stuck.len();

        for task in stuck {
            let error = format!(
                "processing timed out after {}s without worker report",
                timeout.as_secs()
            );
            self.fail(&task.id, &error, false).await?;
        }

        if count > 0 {
            warn!(count, "reset stuck tasks");
        }
        Ok(count)
    }

    /// Cancel pending tasks that have waited longer than the pending
    /// timeout - guards against dependencies that will never be satisfied.
    pub async fn cleanup_stale_pending(&self, timeout: Duration) -> Result<usize, DieselError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(timeout.as_secs() as i64);
        let count = busy_retry!(
            self.config,
            self.store
                .cancel_stale_pending(cutoff, STALE_PENDING_REASON)
                .await
        )?;
        if count > 0 {
            info!(count, "cancelled stale pending tasks");
        }
        Ok(count)
    }

    /// Cancel tasks whose referenced insight was deleted, instead of
    /// letting them retry forever against a missing entity.
    pub async fn purge_invalid(&self) -> Result<usize, DieselError> {
        let linked = self.store.active_entity_tasks(ENTITY_INSIGHT).await?;
        if linked.is_empty() {
            return Ok(0);
        }

        let mut known: HashMap<i32, bool> = HashMap::new();
        let mut orphans: Vec<String> = Vec::new();
        let mut missing: HashSet<i32> = HashSet::new();

        for (task_id, entity_id) in linked {
            let exists = match known.get(&entity_id) {
                Some(exists) => *exists,
                None => {
                    let exists = self.insights.exists(entity_id).await?;
                    known.insert(entity_id, exists);
                    exists
                }
            };
            if !exists {
                missing.insert(entity_id);
                orphans.push(task_id);
            }
        }

        let count = busy_retry!(
            self.config,
            self.store.cancel_by_ids(&orphans, ORPHAN_REASON).await
        )?;
        if count > 0 {
            info!(count, insights = missing.len(), "purged orphaned tasks");
        }
        Ok(count)
    }

    /// Delete terminal task rows older than the retention window.
    pub async fn cleanup_old(&self, days: i64) -> Result<usize, DieselError> {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let count = busy_retry!(self.config, self.store.delete_terminal_before(cutoff).await)?;
        if count > 0 {
            info!(count, days, "deleted old task rows");
        }
        Ok(count)
    }

    /// Task counts by status. Reads run without serialization.
    pub async fn get_stats(&self) -> Result<TaskStats, DieselError> {
        self.store.counts().await
    }

    /// Queue health: critical when the failure rate among all recorded
    /// tasks exceeds the configured threshold.
    pub async fn get_health(&self) -> Result<QueueHealth, DieselError> {
        let stats = self.get_stats().await?;
        let total = stats.total();
        let failure_rate = if total == 0 {
            0.0
        } else {
            stats.failed as f64 / total as f64
        };
        let status = if failure_rate > self.config.health_failure_threshold {
            HealthStatus::Critical
        } else {
            HealthStatus::Healthy
        };
        Ok(QueueHealth {
            status,
            failure_rate,
            stats,
        })
    }

    /// Periodic maintenance pass, run by the designated worker.
    pub async fn run_maintenance(&self) -> Result<(), DieselError> {
        self.reset_stuck(self.config.processing_timeout).await?;
        self.cleanup_stale_pending(self.config.pending_timeout)
            .await?;
        self.purge_invalid().await?;
        self.cleanup_old(self.config.retention_days).await?;
        Ok(())
    }
}
