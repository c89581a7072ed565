//! Enqueue the analysis pipeline for insights.

use std::sync::Arc;

use tracing::{debug, info};

use crate::models::{Insight, InsightStatus, TaskPayload};
use crate::queue::{EnqueueOptions, TaskQueue};
use crate::repository::{DieselError, InsightRepository};

/// Image tasks run ahead of the text tasks waiting on them.
const IMAGE_TASK_PRIORITY: i32 = 10;

/// Builds the task graph for an insight: an image-analysis task plus a
/// dependent text-analysis task when a chart image is attached, otherwise
/// a lone text-analysis task.
pub struct AnalysisTrigger {
    queue: Arc<TaskQueue>,
    insights: InsightRepository,
}

impl AnalysisTrigger {
    pub fn new(queue: Arc<TaskQueue>, insights: InsightRepository) -> Self {
        Self { queue, insights }
    }

    /// Enqueue analysis for one insight. Returns the enqueued task ids.
    pub async fn trigger_insight(&self, insight: &Insight) -> Result<Vec<String>, DieselError> {
        let mut task_ids = Vec::new();

        let image_task_id = match &insight.image_url {
            Some(image_url) => {
                let id = self
                    .queue
                    .enqueue(
                        TaskPayload::ImageAnalysis {
                            insight_id: insight.id,
                            symbol: insight.symbol.clone(),
                            image_url: image_url.clone(),
                        },
                        EnqueueOptions {
                            priority: IMAGE_TASK_PRIORITY,
                            ..EnqueueOptions::for_insight(insight.id)
                        },
                    )
                    .await?;
                task_ids.push(id.clone());
                Some(id)
            }
            None => None,
        };

        let text_task_id = self
            .queue
            .enqueue(
                TaskPayload::TextAnalysis {
                    insight_id: insight.id,
                    requires_image_analysis: image_task_id.is_some(),
                    depends_on: image_task_id,
                    image_context: None,
                },
                EnqueueOptions::for_insight(insight.id),
            )
            .await?;
        task_ids.push(text_task_id);

        debug!(insight_id = insight.id, tasks = task_ids.len(), "analysis triggered");
        Ok(task_ids)
    }

    /// Enqueue analysis for every insight still in `new`. Returns the
    /// number of insights triggered.
    pub async fn trigger_pending(&self, limit: i64) -> Result<usize, DieselError> {
        let pending = self.insights.list(Some(InsightStatus::New), limit).await?;
        let count = pending.len();

        for insight in &pending {
            self.trigger_insight(insight).await?;
        }

        if count > 0 {
            info!(count, "triggered analysis for unprocessed insights");
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewInsight;
    use crate::queue::QueueConfig;
    use crate::repository::{migrations, DbContext};
    use tempfile::tempdir;

    async fn setup() -> (AnalysisTrigger, Arc<TaskQueue>, DbContext, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db_url = format!("sqlite:{}", db_path.display());
        migrations::run_migrations(&db_url).await.unwrap();
        let ctx = DbContext::from_path(&db_path);
        let queue = Arc::new(TaskQueue::new(
            ctx.tasks(),
            ctx.insights(),
            QueueConfig::default(),
        ));
        let trigger = AnalysisTrigger::new(queue.clone(), ctx.insights());
        (trigger, queue, ctx, dir)
    }

    fn item(url: &str, image: Option<&str>) -> NewInsight {
        NewInsight {
            symbol: "AMD".to_string(),
            title: "Guidance raised".to_string(),
            content: "Full-year guidance raised on AI demand.".to_string(),
            source_url: url.to_string(),
            image_url: image.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_insight_with_image_gets_dependent_pair() {
        let (trigger, queue, ctx, _dir) = setup().await;
        let insight = ctx
            .insights()
            .create(&item("https://example.com/a", Some("https://example.com/c.png")))
            .await
            .unwrap();

        let ids = trigger.trigger_insight(&insight).await.unwrap();
        assert_eq!(ids.len(), 2);

        let image_task = queue.get_task(&ids[0]).await.unwrap().unwrap();
        let text_task = queue.get_task(&ids[1]).await.unwrap().unwrap();
        assert_eq!(image_task.task_type, "image_analysis");
        assert_eq!(text_task.task_type, "text_analysis");
        assert!(image_task.priority > text_task.priority);

        match text_task.typed_payload().unwrap() {
            TaskPayload::TextAnalysis {
                depends_on,
                requires_image_analysis,
                ..
            } => {
                assert_eq!(depends_on.as_deref(), Some(ids[0].as_str()));
                assert!(requires_image_analysis);
            }
            _ => panic!("wrong payload"),
        }

        // The image task outranks the text task in claim order
        let first = queue.claim_next().await.unwrap().unwrap();
        assert_eq!(first.id, ids[0]);
    }

    #[tokio::test]
    async fn test_insight_without_image_gets_lone_text_task() {
        let (trigger, queue, ctx, _dir) = setup().await;
        let insight = ctx
            .insights()
            .create(&item("https://example.com/b", None))
            .await
            .unwrap();

        let ids = trigger.trigger_insight(&insight).await.unwrap();
        assert_eq!(ids.len(), 1);

        let task = queue.get_task(&ids[0]).await.unwrap().unwrap();
        match task.typed_payload().unwrap() {
            TaskPayload::TextAnalysis {
                depends_on,
                requires_image_analysis,
                ..
            } => {
                assert!(depends_on.is_none());
                assert!(!requires_image_analysis);
            }
            _ => panic!("wrong payload"),
        }
    }

    #[tokio::test]
    async fn test_trigger_pending_covers_new_insights_only() {
        let (trigger, queue, ctx, _dir) = setup().await;
        let a = ctx
            .insights()
            .create(&item("https://example.com/1", None))
            .await
            .unwrap();
        ctx.insights()
            .create(&item("https://example.com/2", None))
            .await
            .unwrap();
        ctx.insights()
            .update_status(a.id, InsightStatus::Completed)
            .await
            .unwrap();

        let count = trigger.trigger_pending(100).await.unwrap();
        assert_eq!(count, 1);
        let stats = queue.get_stats().await.unwrap();
        assert_eq!(stats.pending, 1);
    }
}
