//! Insight repository - CRUD and status updates for finance news items.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{InsightRecord, NewInsightRecord};
use super::pool::{DieselError, SqlitePool};
use crate::models::{Insight, InsightAnalysis, InsightStatus, NewInsight};
use crate::schema::insights;

/// Repository for the `insights` table.
///
/// This is the entity-side collaborator of the task queue: handlers read
/// insights through it, write analysis results back, and cascade status
/// changes as tasks progress.
#[derive(Clone)]
pub struct InsightRepository {
    pool: SqlitePool,
}

impl InsightRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new insight and return it.
    ///
    /// Fails on a duplicate `source_url` (unique index) - callers that
    /// ingest feeds should check `find_by_source_url` first.
    pub async fn create(&self, insight: &NewInsight) -> Result<Insight, DieselError> {
        let record = NewInsightRecord::from(insight);
        let mut conn = self.pool.get().await?;

        diesel::insert_into(insights::table)
            .values(&record)
            .execute(&mut conn)
            .await?;

        // source_url is unique, so this resolves the row we just wrote
        let stored: InsightRecord = insights::table
            .filter(insights::source_url.eq(&record.source_url))
            .first(&mut conn)
            .await?;

        Ok(Insight::from(stored))
    }

    /// Get an insight by id.
    pub async fn get_by_id(&self, id: i32) -> Result<Option<Insight>, DieselError> {
        let mut conn = self.pool.get().await?;
        let record: Option<InsightRecord> = insights::table
            .find(id)
            .first(&mut conn)
            .await
            .optional()?;
        Ok(record.map(Insight::from))
    }

    /// Check whether an insight exists (orphan detection).
    pub async fn exists(&self, id: i32) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;
        let count: i64 = insights::table
            .find(id)
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count > 0)
    }

    /// Find an insight by its canonical source URL.
    pub async fn find_by_source_url(&self, url: &str) -> Result<Option<Insight>, DieselError> {
        let mut conn = self.pool.get().await?;
        let record: Option<InsightRecord> = insights::table
            .filter(insights::source_url.eq(url))
            .first(&mut conn)
            .await
            .optional()?;
        Ok(record.map(Insight::from))
    }

    /// List insights, newest first, optionally filtered by status.
    pub async fn list(
        &self,
        status: Option<InsightStatus>,
        limit: i64,
    ) -> Result<Vec<Insight>, DieselError> {
        let mut conn = self.pool.get().await?;
        let mut query = insights::table
            .order(insights::created_at.desc())
            .limit(limit)
            .into_boxed();

        if let Some(status) = status {
            query = query.filter(insights::status.eq(status.as_str()));
        }

        let records: Vec<InsightRecord> = query.load(&mut conn).await?;
        Ok(records.into_iter().map(Insight::from).collect())
    }

    /// Update an insight's analysis status.
    pub async fn update_status(
        &self,
        id: i32,
        status: InsightStatus,
    ) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;
        let rows = diesel::update(insights::table.find(id))
            .set((
                insights::status.eq(status.as_str()),
                insights::updated_at.eq(Utc::now().to_rfc3339()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(rows > 0)
    }

    /// Store LLM analysis results on an insight.
    pub async fn apply_analysis(
        &self,
        id: i32,
        analysis: &InsightAnalysis,
    ) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;
        let rows = diesel::update(insights::table.find(id))
            .set((
                insights::summary.eq(Some(analysis.summary.clone())),
                insights::action.eq(Some(analysis.action.clone())),
                insights::confidence.eq(Some(analysis.confidence)),
                insights::event_time.eq(analysis.event_time.map(|dt| dt.to_rfc3339())),
                insights::levels.eq(analysis.levels.as_ref().map(|l| l.to_string())),
                insights::updated_at.eq(Utc::now().to_rfc3339()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(rows > 0)
    }

    /// Delete an insight. Orphaned tasks referencing it are cancelled by
    /// the queue's maintenance pass, not here.
    pub async fn delete(&self, id: i32) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;
        let rows = diesel::delete(insights::table.find(id))
            .execute(&mut conn)
            .await?;
        Ok(rows > 0)
    }

    /// Count insights by status.
    pub async fn count_by_status(&self, status: InsightStatus) -> Result<i64, DieselError> {
        let mut conn = self.pool.get().await?;
        insights::table
            .filter(insights::status.eq(status.as_str()))
            .count()
            .get_result(&mut conn)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{migrations, DbContext};
    use tempfile::tempdir;

    async fn setup_test_db() -> (DbContext, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");

        let db_url = format!("sqlite:{}", db_path.display());
        migrations::run_migrations(&db_url).await.unwrap();
        let ctx = DbContext::from_path(&db_path);
        (ctx, dir)
    }

    fn sample_insight(url: &str) -> NewInsight {
        NewInsight {
            symbol: "AAPL".to_string(),
            title: "Apple beats earnings".to_string(),
            content: "Apple reported quarterly earnings above expectations.".to_string(),
            source_url: url.to_string(),
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.insights();

        let created = repo
            .create(&sample_insight("https://example.com/a"))
            .await
            .unwrap();
        assert_eq!(created.status, InsightStatus::New);

        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.symbol, "AAPL");
        assert_eq!(fetched.source_url, "https://example.com/a");
        assert!(repo.exists(created.id).await.unwrap());
        assert!(!repo.exists(created.id + 999).await.unwrap());
    }

    #[tokio::test]
    async fn test_status_and_analysis_updates() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.insights();

        let created = repo
            .create(&sample_insight("https://example.com/b"))
            .await
            .unwrap();

        assert!(repo
            .update_status(created.id, InsightStatus::Processing)
            .await
            .unwrap());

        let analysis = InsightAnalysis {
            summary: "Strong quarter".to_string(),
            action: "watch".to_string(),
            confidence: 0.75,
            event_time: None,
            levels: Some(serde_json::json!({ "resistance": 200.0 })),
        };
        assert!(repo.apply_analysis(created.id, &analysis).await.unwrap());
        assert!(repo
            .update_status(created.id, InsightStatus::Completed)
            .await
            .unwrap());

        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, InsightStatus::Completed);
        assert_eq!(fetched.summary.as_deref(), Some("Strong quarter"));
        assert_eq!(fetched.confidence, Some(0.75));
        assert_eq!(
            fetched.levels,
            Some(serde_json::json!({ "resistance": 200.0 }))
        );
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.insights();

        let a = repo
            .create(&sample_insight("https://example.com/1"))
            .await
            .unwrap();
        repo.create(&sample_insight("https://example.com/2"))
            .await
            .unwrap();
        repo.update_status(a.id, InsightStatus::Completed)
            .await
            .unwrap();

        let fresh = repo.list(Some(InsightStatus::New), 10).await.unwrap();
        assert_eq!(fresh.len(), 1);
        let all = repo.list(None, 10).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_delete() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.insights();

        let created = repo
            .create(&sample_insight("https://example.com/del"))
            .await
            .unwrap();
        assert!(repo.delete(created.id).await.unwrap());
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
        assert!(!repo.delete(created.id).await.unwrap());
    }
}
