//! Task store - all SQL access for the persistent task queue.
//!
//! Policy (retry budgets, backoff, cascades) lives in `queue::TaskQueue`;
//! this layer owns the row-level operations and their atomicity. Every
//! mutation is status-guarded so a row that moved under us changes zero
//! rows instead of being corrupted.

use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel_async::{RunQueryDsl, SimpleAsyncConnection};

use super::models::TaskRecord;
use super::pool::{DieselError, SqliteConn, SqlitePool};
use crate::models::{Task, TaskStats, TaskStatus};
use crate::schema::tasks;

/// Re-selects per claim transaction before giving up.
const CLAIM_ATTEMPTS: usize = 3;

const ACTIVE_STATUSES: [&str; 2] = ["pending", "processing"];
const TERMINAL_STATUSES: [&str; 3] = ["completed", "failed", "cancelled"];

/// Durable store for task rows.
#[derive(Clone)]
pub struct TaskStore {
    pool: SqlitePool,
}

impl TaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new task row.
    pub async fn insert(&self, task: &Task) -> Result<(), DieselError> {
        let record = TaskRecord::from(task);
        let mut conn = self.pool.get().await?;
        diesel::insert_into(tasks::table)
            .values(&record)
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Get a task by id.
    pub async fn get(&self, id: &str) -> Result<Option<Task>, DieselError> {
        let mut conn = self.pool.get().await?;
        let record: Option<TaskRecord> =
            tasks::table.find(id).first(&mut conn).await.optional()?;
        Ok(record.map(Task::from))
    }

    /// Atomically claim the next eligible pending task.
    ///
    /// Runs as a single `BEGIN IMMEDIATE` transaction: the write lock is
    /// taken up front, so two pollers serialize here and the conditional
    /// update can never move the same row twice. Eligibility: status
    /// pending, backoff gate passed; ordering: priority desc, oldest first.
    pub async fn claim_next(&self) -> Result<Option<Task>, DieselError> {
        let now = Utc::now();
        let now_s = now.to_rfc3339();
        let mut conn = self.pool.get().await?;

        conn.batch_execute("BEGIN IMMEDIATE").await?;
        match Self::claim_in_tx(&mut conn, &now_s).await {
            Ok(claimed) => {
                conn.batch_execute("COMMIT").await?;
                Ok(claimed.map(|record| {
                    let mut task = Task::from(record);
                    task.status = TaskStatus::Processing;
                    task.started_at = Some(now);
                    task
                }))
            }
            Err(e) => {
                let _ = conn.batch_execute("ROLLBACK").await;
                Err(e)
            }
        }
    }

    async fn claim_in_tx(
        conn: &mut SqliteConn,
        now_s: &str,
    ) -> Result<Option<TaskRecord>, DieselError> {
        // A claim lost to a racing worker shows up as zero updated rows;
        // re-select until a claim sticks or no candidate remains.
        for _ in 0..CLAIM_ATTEMPTS {
            let candidate: Option<TaskRecord> = tasks::table
                .filter(tasks::status.eq(TaskStatus::Pending.as_str()))
                .filter(
                    tasks::next_retry_at
                        .is_null()
                        .or(tasks::next_retry_at.le(now_s.to_string())),
                )
                .order((tasks::priority.desc(), tasks::created_at.asc()))
                .first(conn)
                .await
                .optional()?;

            let Some(record) = candidate else {
                return Ok(None);
            };

            let updated = diesel::update(
                tasks::table
                    .filter(tasks::id.eq(&record.id))
                    .filter(tasks::status.eq(TaskStatus::Pending.as_str())),
            )
            .set((
                tasks::status.eq(TaskStatus::Processing.as_str()),
                tasks::started_at.eq(Some(now_s.to_string())),
            ))
            .execute(conn)
            .await?;

            if updated == 1 {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Mark a processing task completed. Returns false if the row was not
    /// in processing (already terminal) - callers treat that as a no-op.
    pub async fn mark_completed(
        &self,
        id: &str,
        result: Option<&serde_json::Value>,
    ) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;
        let rows = diesel::update(
            tasks::table
                .filter(tasks::id.eq(id))
                .filter(tasks::status.eq(TaskStatus::Processing.as_str())),
        )
        .set((
            tasks::status.eq(TaskStatus::Completed.as_str()),
            tasks::completed_at.eq(Some(Utc::now().to_rfc3339())),
            tasks::result.eq(result.map(|r| r.to_string())),
        ))
        .execute(&mut conn)
        .await?;
        Ok(rows == 1)
    }

    /// Return a processing task to pending for another attempt.
    pub async fn reschedule(
        &self,
        id: &str,
        retries: u32,
        priority: i32,
        next_retry_at: DateTime<Utc>,
        error: &str,
    ) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;
        let rows = diesel::update(
            tasks::table
                .filter(tasks::id.eq(id))
                .filter(tasks::status.eq(TaskStatus::Processing.as_str())),
        )
        .set((
            tasks::status.eq(TaskStatus::Pending.as_str()),
            tasks::retries.eq(retries as i32),
            tasks::priority.eq(priority),
            tasks::started_at.eq(None::<String>),
            tasks::next_retry_at.eq(Some(next_retry_at.to_rfc3339())),
            tasks::error.eq(Some(error.to_string())),
        ))
        .execute(&mut conn)
        .await?;
        Ok(rows == 1)
    }

    /// Mark a processing task permanently failed.
    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;
        let rows = diesel::update(
            tasks::table
                .filter(tasks::id.eq(id))
                .filter(tasks::status.eq(TaskStatus::Processing.as_str())),
        )
        .set((
            tasks::status.eq(TaskStatus::Failed.as_str()),
            tasks::completed_at.eq(Some(Utc::now().to_rfc3339())),
            tasks::error.eq(Some(error.to_string())),
        ))
        .execute(&mut conn)
        .await?;
        Ok(rows == 1)
    }

    /// Push a processing task back to pending without touching its retry
    /// count (dependency-not-ready path).
    pub async fn postpone(
        &self,
        id: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;
        let rows = diesel::update(
            tasks::table
                .filter(tasks::id.eq(id))
                .filter(tasks::status.eq(TaskStatus::Processing.as_str())),
        )
        .set((
            tasks::status.eq(TaskStatus::Pending.as_str()),
            tasks::started_at.eq(None::<String>),
            tasks::next_retry_at.eq(Some(next_retry_at.to_rfc3339())),
        ))
        .execute(&mut conn)
        .await?;
        Ok(rows == 1)
    }

    /// Cancel all pending and processing tasks, recording a reason.
    pub async fn cancel_active(&self, reason: &str) -> Result<usize, DieselError> {
        let mut conn = self.pool.get().await?;
        diesel::update(tasks::table.filter(tasks::status.eq_any(ACTIVE_STATUSES)))
            .set((
                tasks::status.eq(TaskStatus::Cancelled.as_str()),
                tasks::completed_at.eq(Some(Utc::now().to_rfc3339())),
                tasks::error.eq(Some(reason.to_string())),
            ))
            .execute(&mut conn)
            .await
    }

    /// Cancel specific tasks by id (orphan purge), active rows only.
    pub async fn cancel_by_ids(&self, ids: &[String], reason: &str) -> Result<usize, DieselError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.pool.get().await?;
        diesel::update(
            tasks::table
                .filter(tasks::id.eq_any(ids))
                .filter(tasks::status.eq_any(ACTIVE_STATUSES)),
        )
        .set((
            tasks::status.eq(TaskStatus::Cancelled.as_str()),
            tasks::completed_at.eq(Some(Utc::now().to_rfc3339())),
            tasks::error.eq(Some(reason.to_string())),
        ))
        .execute(&mut conn)
        .await
    }

    /// Processing tasks whose claim predates the cutoff (worker died
    /// without reporting back).
    pub async fn stale_processing(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Task>, DieselError> {
        let mut conn = self.pool.get().await?;
        let records: Vec<TaskRecord> = tasks::table
            .filter(tasks::status.eq(TaskStatus::Processing.as_str()))
            .filter(tasks::started_at.le(cutoff.to_rfc3339()))
            .load(&mut conn)
            .await?;
        Ok(records.into_iter().map(Task::from).collect())
    }

    /// Cancel pending tasks that have waited since before the cutoff.
    pub async fn cancel_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        reason: &str,
    ) -> Result<usize, DieselError> {
        let mut conn = self.pool.get().await?;
        diesel::update(
            tasks::table
                .filter(tasks::status.eq(TaskStatus::Pending.as_str()))
                .filter(tasks::created_at.le(cutoff.to_rfc3339())),
        )
        .set((
            tasks::status.eq(TaskStatus::Cancelled.as_str()),
            tasks::completed_at.eq(Some(Utc::now().to_rfc3339())),
            tasks::error.eq(Some(reason.to_string())),
        ))
        .execute(&mut conn)
        .await
    }

    /// Active tasks carrying an entity back-reference of the given type.
    /// Returns (task id, entity id) pairs for orphan detection.
    pub async fn active_entity_tasks(
        &self,
        entity_type: &str,
    ) -> Result<Vec<(String, i32)>, DieselError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<(String, Option<i32>)> = tasks::table
            .filter(tasks::status.eq_any(ACTIVE_STATUSES))
            .filter(tasks::entity_type.eq(entity_type))
            .select((tasks::id, tasks::entity_id))
            .load(&mut conn)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(id, entity_id)| entity_id.map(|e| (id, e)))
            .collect())
    }

    /// Task counts by status.
    pub async fn counts(&self) -> Result<TaskStats, DieselError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<(String, i64)> = tasks::table
            .group_by(tasks::status)
            .select((tasks::status, count_star()))
            .load(&mut conn)
            .await?;

        let mut stats = TaskStats::default();
        for (status, count) in rows {
            let count = count.max(0) as u64;
            match TaskStatus::from_str(&status) {
                Some(TaskStatus::Pending) => stats.pending = count,
                Some(TaskStatus::Processing) => stats.processing = count,
                Some(TaskStatus::Completed) => stats.completed = count,
                Some(TaskStatus::Failed) => stats.failed = count,
                Some(TaskStatus::Cancelled) => stats.cancelled = count,
                None => {}
            }
        }
        Ok(stats)
    }

    /// Backdate a claim timestamp to simulate a dead worker in tests.
    #[cfg(test)]
    pub async fn force_started_at(&self, id: &str, started_at: DateTime<Utc>) {
        let mut conn = self.pool.get().await.unwrap();
        diesel::update(tasks::table.find(id))
            .set(tasks::started_at.eq(Some(started_at.to_rfc3339())))
            .execute(&mut conn)
            .await
            .unwrap();
    }

    /// Backdate a creation timestamp for stale/retention tests.
    #[cfg(test)]
    pub async fn force_created_at(&self, id: &str, created_at: DateTime<Utc>) {
        let mut conn = self.pool.get().await.unwrap();
        diesel::update(tasks::table.find(id))
            .set(tasks::created_at.eq(created_at.to_rfc3339()))
            .execute(&mut conn)
            .await
            .unwrap();
    }

    /// Delete terminal rows older than the cutoff (retention cleanup -
    /// the only path that removes task rows).
    pub async fn delete_terminal_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, DieselError> {
        let mut conn = self.pool.get().await?;
        diesel::delete(
            tasks::table
                .filter(tasks::status.eq_any(TERMINAL_STATUSES))
                .filter(tasks::created_at.le(cutoff.to_rfc3339())),
        )
        .execute(&mut conn)
        .await
    }
}
