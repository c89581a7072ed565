//! Handler for insight text analysis tasks.
//!
//! Carries the dependency half of the image-then-text chain: when the
//! payload names an image-analysis task, this handler waits for it by
//! postponing itself until the dependency reaches a terminal status.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{HandlerOutcome, TaskHandler};
use crate::analysis::{AnalysisProvider, LlmError};
use crate::models::{task_types, Insight, InsightStatus, Task, TaskPayload, TaskStatus};
use crate::repository::{InsightRepository, TaskStore};

/// Runs LLM analysis over an insight's text and writes the result back to
/// the insight row.
pub struct TextAnalysisHandler {
    insights: InsightRepository,
    tasks: TaskStore,
    provider: Arc<dyn AnalysisProvider>,
    /// How long to postpone while the image dependency is still running.
    dependency_delay: Duration,
}

enum DependencyState {
    /// Proceed with this image context (possibly none).
    Ready(Option<String>),
    /// Dependency still in flight.
    Wait,
    /// A required dependency can never complete.
    Broken(String),
}

impl TextAnalysisHandler {
    pub fn new(
        insights: InsightRepository,
        tasks: TaskStore,
        provider: Arc<dyn AnalysisProvider>,
        dependency_delay: Duration,
    ) -> Self {
        Self {
            insights,
            tasks,
            provider,
            dependency_delay,
        }
    }

    /// Resolve the image-analysis dependency named in the payload.
    async fn check_dependency(
        &self,
        dep_id: &str,
        required: bool,
    ) -> Result<DependencyState, String> {
        let dep = self
            .tasks
            .get(dep_id)
            .await
            .map_err(|e| format!("dependency lookup failed: {}", e))?;

        let Some(dep) = dep else {
            if required {
                return Ok(DependencyState::Broken(format!(
                    "required dependency task {} does not exist",
                    dep_id
                )));
            }
            return Ok(DependencyState::Ready(None));
        };

        match dep.status {
            TaskStatus::Completed => {
                let context = dep
                    .result
                    .as_ref()
                    .and_then(|r| r.get("description"))
                    .and_then(|d| d.as_str())
                    .map(str::to_string);
                Ok(DependencyState::Ready(context))
            }
            TaskStatus::Pending | TaskStatus::Processing => Ok(DependencyState::Wait),
            TaskStatus::Failed | TaskStatus::Cancelled => {
                if required {
                    Ok(DependencyState::Broken(format!(
                        "required image analysis {} ended {}",
                        dep_id,
                        dep.status.as_str()
                    )))
                } else {
                    // Best-effort context: analyze without it
                    Ok(DependencyState::Ready(None))
                }
            }
        }
    }

    async fn analyze(&self, insight: &Insight, context: Option<String>) -> HandlerOutcome {
        if let Err(e) = self
            .insights
            .update_status(insight.id, InsightStatus::Processing)
            .await
        {
            return HandlerOutcome::Retry(format!("status update failed: {}", e));
        }

        let analysis = match self
            .provider
            .analyze_text(&insight.content, context.as_deref())
            .await
        {
            Ok(analysis) => analysis,
            Err(LlmError::Disabled) => {
                return HandlerOutcome::Permanent("llm analysis is disabled".into())
            }
            Err(e) => return HandlerOutcome::Retry(e.to_string()),
        };

        if let Err(e) = self.insights.apply_analysis(insight.id, &analysis).await {
            return HandlerOutcome::Retry(format!("storing analysis failed: {}", e));
        }
        if let Err(e) = self
            .insights
            .update_status(insight.id, InsightStatus::Completed)
            .await
        {
            return HandlerOutcome::Retry(format!("status update failed: {}", e));
        }

        debug!(insight_id = insight.id, action = %analysis.action, "text analysis finished");
        match serde_json::to_value(&analysis) {
            Ok(value) => HandlerOutcome::Success(Some(value)),
            Err(_) => HandlerOutcome::Success(None),
        }
    }
}

#[async_trait]
impl TaskHandler for TextAnalysisHandler {
    fn task_type(&self) -> &'static str {
        task_types::TEXT_ANALYSIS
    }

    async fn execute(&self, task: &Task) -> HandlerOutcome {
        let (insight_id, depends_on, required, image_context) = match task.typed_payload() {
            Ok(TaskPayload::TextAnalysis {
                insight_id,
                depends_on,
                requires_image_analysis,
                image_context,
            }) => (insight_id, depends_on, requires_image_analysis, image_context),
            Ok(_) => {
                return HandlerOutcome::Permanent("payload is not a text_analysis payload".into())
            }
            Err(e) => return HandlerOutcome::Permanent(format!("malformed payload: {}", e)),
        };

        let insight = match self.insights.get_by_id(insight_id).await {
            Ok(Some(insight)) => insight,
            Ok(None) => {
                return HandlerOutcome::Permanent(format!("insight {} no longer exists", insight_id))
            }
            Err(e) => return HandlerOutcome::Retry(format!("insight lookup failed: {}", e)),
        };

        // Context embedded in the payload wins; otherwise consult the
        // dependency task.
        let context = if image_context.is_some() {
            image_context
        } else if let Some(dep_id) = &depends_on {
            match self.check_dependency(dep_id, required).await {
                Ok(DependencyState::Ready(context)) => context,
                Ok(DependencyState::Wait) => {
                    debug!(task_id = %task.id, dep_id = %dep_id, "image dependency still running");
                    return HandlerOutcome::Postpone(self.dependency_delay);
                }
                Ok(DependencyState::Broken(reason)) => return HandlerOutcome::Permanent(reason),
                Err(e) => return HandlerOutcome::Retry(e),
            }
        } else {
            None
        };

        self.analyze(&insight, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::LlmError;
    use crate::models::{InsightAnalysis, NewInsight};
    use crate::queue::{EnqueueOptions, QueueConfig, TaskQueue};
    use crate::repository::{migrations, DbContext};
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Scripted provider: pops pre-programmed responses, recording the
    /// context it was called with.
    struct ScriptedProvider {
        text_results: Mutex<Vec<Result<InsightAnalysis, LlmError>>>,
        seen_context: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedProvider {
        fn new(results: Vec<Result<InsightAnalysis, LlmError>>) -> Self {
            Self {
                text_results: Mutex::new(results),
                seen_context: Mutex::new(Vec::new()),
            }
        }

        fn analysis(summary: &str) -> InsightAnalysis {
            InsightAnalysis {
                summary: summary.to_string(),
                action: "watch".to_string(),
                confidence: 0.8,
                event_time: None,
                levels: None,
            }
        }
    }

    #[async_trait]
    impl AnalysisProvider for ScriptedProvider {
        async fn analyze_image(&self, _: &str, _: &str) -> Result<Option<String>, LlmError> {
            Ok(Some("Uptrend with support at 180.".to_string()))
        }

        async fn analyze_text(
            &self,
            _text: &str,
            context: Option<&str>,
        ) -> Result<InsightAnalysis, LlmError> {
            self.seen_context
                .lock()
                .unwrap()
                .push(context.map(str::to_string));
            self.text_results
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(Self::analysis("fallback")))
        }
    }

    struct Fixture {
        ctx: DbContext,
        queue: TaskQueue,
        _dir: tempfile::TempDir,
    }

    async fn setup() -> Fixture {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db_url = format!("sqlite:{}", db_path.display());
        migrations::run_migrations(&db_url).await.unwrap();
        let ctx = DbContext::from_path(&db_path);
        let queue = TaskQueue::new(ctx.tasks(), ctx.insights(), QueueConfig::default());
        Fixture {
            ctx,
            queue,
            _dir: dir,
        }
    }

    async fn create_insight(ctx: &DbContext) -> Insight {
        ctx.insights()
            .create(&NewInsight {
                symbol: "NVDA".to_string(),
                title: "Chip demand surges".to_string(),
                content: "Data center revenue doubled year over year.".to_string(),
                source_url: "https://example.com/nvda".to_string(),
                image_url: Some("https://example.com/chart.png".to_string()),
            })
            .await
            .unwrap()
    }

    fn handler(fx: &Fixture, provider: Arc<ScriptedProvider>) -> TextAnalysisHandler {
        TextAnalysisHandler::new(
            fx.ctx.insights(),
            fx.ctx.tasks(),
            provider,
            Duration::from_secs(180),
        )
    }

    async fn claimed_text_task(fx: &Fixture, payload: TaskPayload) -> Task {
        fx.queue
            .enqueue(payload, EnqueueOptions::default())
            .await
            .unwrap();
        fx.queue.claim_next().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_success_writes_analysis_to_insight() {
        let fx = setup().await;
        let insight = create_insight(&fx.ctx).await;
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(ScriptedProvider::analysis(
            "Revenue doubled.",
        ))]));

        let task = claimed_text_task(
            &fx,
            TaskPayload::TextAnalysis {
                insight_id: insight.id,
                depends_on: None,
                requires_image_analysis: false,
                image_context: None,
            },
        )
        .await;

        let outcome = handler(&fx, provider).execute(&task).await;
        let HandlerOutcome::Success(Some(result)) = outcome else {
            panic!("expected success, got {:?}", outcome);
        };
        assert_eq!(result["summary"], "Revenue doubled.");

        let stored = fx.ctx.insights().get_by_id(insight.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InsightStatus::Completed);
        assert_eq!(stored.summary.as_deref(), Some("Revenue doubled."));
    }

    #[tokio::test]
    async fn test_postpones_while_dependency_runs() {
        let fx = setup().await;
        let insight = create_insight(&fx.ctx).await;

        // Image task exists but has not been claimed yet
        let dep_id = fx
            .queue
            .enqueue(
                TaskPayload::ImageAnalysis {
                    insight_id: insight.id,
                    symbol: insight.symbol.clone(),
                    image_url: "https://example.com/chart.png".to_string(),
                },
                EnqueueOptions {
                    priority: 100,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let text_task = TaskPayload::TextAnalysis {
            insight_id: insight.id,
            depends_on: Some(dep_id.clone()),
            requires_image_analysis: true,
            image_context: None,
        };
        let task = Task {
            id: "text-task".to_string(),
            task_type: text_task.task_type().to_string(),
            payload: text_task.to_value(),
            status: TaskStatus::Processing,
            retries: 0,
            max_retries: 3,
            priority: 0,
            created_at: chrono::Utc::now(),
            started_at: Some(chrono::Utc::now()),
            completed_at: None,
            next_retry_at: None,
            result: None,
            error: None,
            entity_type: None,
            entity_id: Some(insight.id),
        };

        let outcome = handler(&fx, provider.clone()).execute(&task).await;
        assert!(matches!(
            outcome,
            HandlerOutcome::Postpone(d) if d == Duration::from_secs(180)
        ));
        // The model was never consulted
        assert!(provider.seen_context.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_uses_completed_dependency_context() {
        let fx = setup().await;
        let insight = create_insight(&fx.ctx).await;

        let dep_id = fx
            .queue
            .enqueue(
                TaskPayload::ImageAnalysis {
                    insight_id: insight.id,
                    symbol: insight.symbol.clone(),
                    image_url: "https://example.com/chart.png".to_string(),
                },
                EnqueueOptions {
                    priority: 100,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Complete the image task with a chart description
        let claimed = fx.queue.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id, dep_id);
        fx.queue
            .complete(
                &dep_id,
                Some(serde_json::json!({ "description": "Uptrend with support at 180." })),
            )
            .await
            .unwrap();

        let provider = Arc::new(ScriptedProvider::new(vec![Ok(ScriptedProvider::analysis(
            "Bullish.",
        ))]));
        let task = claimed_text_task(
            &fx,
            TaskPayload::TextAnalysis {
                insight_id: insight.id,
                depends_on: Some(dep_id),
                requires_image_analysis: true,
                image_context: None,
            },
        )
        .await;

        let outcome = handler(&fx, provider.clone()).execute(&task).await;
        assert!(matches!(outcome, HandlerOutcome::Success(_)));

        let seen = provider.seen_context.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            &[Some("Uptrend with support at 180.".to_string())]
        );
    }

    #[tokio::test]
    async fn test_required_failed_dependency_is_permanent() {
        let fx = setup().await;
        let insight = create_insight(&fx.ctx).await;

        let dep_id = fx
            .queue
            .enqueue(
                TaskPayload::ImageAnalysis {
                    insight_id: insight.id,
                    symbol: insight.symbol.clone(),
                    image_url: "https://example.com/chart.png".to_string(),
                },
                EnqueueOptions {
                    max_retries: Some(0),
                    priority: 100,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        fx.queue.claim_next().await.unwrap().unwrap();
        fx.queue.fail(&dep_id, "vision model down", false).await.unwrap();

        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let task = claimed_text_task(
            &fx,
            TaskPayload::TextAnalysis {
                insight_id: insight.id,
                depends_on: Some(dep_id),
                requires_image_analysis: true,
                image_context: None,
            },
        )
        .await;

        let outcome = handler(&fx, provider).execute(&task).await;
        assert!(matches!(outcome, HandlerOutcome::Permanent(_)));
    }

    #[tokio::test]
    async fn test_optional_failed_dependency_proceeds_without_context() {
        let fx = setup().await;
        let insight = create_insight(&fx.ctx).await;

        let dep_id = fx
            .queue
            .enqueue(
                TaskPayload::ImageAnalysis {
                    insight_id: insight.id,
                    symbol: insight.symbol.clone(),
                    image_url: "https://example.com/chart.png".to_string(),
                },
                EnqueueOptions {
                    max_retries: Some(0),
                    priority: 100,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        fx.queue.claim_next().await.unwrap().unwrap();
        fx.queue.fail(&dep_id, "vision model down", false).await.unwrap();

        let provider = Arc::new(ScriptedProvider::new(vec![Ok(ScriptedProvider::analysis(
            "Text only.",
        ))]));
        let task = claimed_text_task(
            &fx,
            TaskPayload::TextAnalysis {
                insight_id: insight.id,
                depends_on: Some(dep_id),
                requires_image_analysis: false,
                image_context: None,
            },
        )
        .await;

        let outcome = handler(&fx, provider.clone()).execute(&task).await;
        assert!(matches!(outcome, HandlerOutcome::Success(_)));
        assert_eq!(provider.seen_context.lock().unwrap().as_slice(), &[None]);
    }

    #[tokio::test]
    async fn test_missing_insight_is_permanent() {
        let fx = setup().await;
        let provider = Arc::new(ScriptedProvider::new(vec![]));

        let task = claimed_text_task(
            &fx,
            TaskPayload::TextAnalysis {
                insight_id: 9999,
                depends_on: None,
                requires_image_analysis: false,
                image_context: None,
            },
        )
        .await;

        let outcome = handler(&fx, provider).execute(&task).await;
        assert!(matches!(outcome, HandlerOutcome::Permanent(_)));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_permanent() {
        let fx = setup().await;
        let provider = Arc::new(ScriptedProvider::new(vec![]));

        let task = Task {
            id: "bad".to_string(),
            task_type: task_types::TEXT_ANALYSIS.to_string(),
            payload: serde_json::json!({ "kind": "mystery" }),
            status: TaskStatus::Processing,
            retries: 0,
            max_retries: 3,
            priority: 0,
            created_at: chrono::Utc::now(),
            started_at: Some(chrono::Utc::now()),
            completed_at: None,
            next_retry_at: None,
            result: None,
            error: None,
            entity_type: None,
            entity_id: None,
        };

        let outcome = handler(&fx, provider).execute(&task).await;
        assert!(matches!(outcome, HandlerOutcome::Permanent(_)));
    }

    #[tokio::test]
    async fn test_llm_failure_is_retryable() {
        let fx = setup().await;
        let insight = create_insight(&fx.ctx).await;
        let provider = Arc::new(ScriptedProvider::new(vec![Err(LlmError::Connection(
            "connection refused".to_string(),
        ))]));

        let task = claimed_text_task(
            &fx,
            TaskPayload::TextAnalysis {
                insight_id: insight.id,
                depends_on: None,
                requires_image_analysis: false,
                image_context: None,
            },
        )
        .await;

        let outcome = handler(&fx, provider).execute(&task).await;
        assert!(matches!(outcome, HandlerOutcome::Retry(_)));
    }
}
