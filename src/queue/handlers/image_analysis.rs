//! Handler for chart image analysis tasks.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{HandlerOutcome, TaskHandler};
use crate::analysis::{AnalysisProvider, LlmError};
use crate::models::{task_types, InsightStatus, Task, TaskPayload};
use crate::repository::InsightRepository;

/// Describes the chart image attached to an insight and stores the
/// description as the task result, where the dependent text-analysis task
/// picks it up.
pub struct ImageAnalysisHandler {
    insights: InsightRepository,
    provider: Arc<dyn AnalysisProvider>,
}

impl ImageAnalysisHandler {
    pub fn new(insights: InsightRepository, provider: Arc<dyn AnalysisProvider>) -> Self {
        Self { insights, provider }
    }
}

#[async_trait]
impl TaskHandler for ImageAnalysisHandler {
    fn task_type(&self) -> &'static str {
        task_types::IMAGE_ANALYSIS
    }

    async fn execute(&self, task: &Task) -> HandlerOutcome {
        let (insight_id, symbol, image_url) = match task.typed_payload() {
            Ok(TaskPayload::ImageAnalysis {
                insight_id,
                symbol,
                image_url,
            }) => (insight_id, symbol, image_url),
            Ok(_) => {
                return HandlerOutcome::Permanent("payload is not an image_analysis payload".into())
            }
            Err(e) => return HandlerOutcome::Permanent(format!("malformed payload: {}", e)),
        };

        // The insight may have been deleted while the task waited
        match self.insights.exists(insight_id).await {
            Ok(true) => {}
            Ok(false) => {
                return HandlerOutcome::Permanent(format!("insight {} no longer exists", insight_id))
            }
            Err(e) => return HandlerOutcome::Retry(format!("insight lookup failed: {}", e)),
        }

        if let Err(e) = self
            .insights
            .update_status(insight_id, InsightStatus::Processing)
            .await
        {
            return HandlerOutcome::Retry(format!("status update failed: {}", e));
        }

        match self.provider.analyze_image(&symbol, &image_url).await {
            Ok(description) => {
                debug!(
                    insight_id,
                    described = description.is_some(),
                    "image analysis finished"
                );
                HandlerOutcome::Success(Some(serde_json::json!({ "description": description })))
            }
            Err(LlmError::Disabled) => {
                HandlerOutcome::Permanent("llm analysis is disabled".into())
            }
            Err(e) => HandlerOutcome::Retry(e.to_string()),
        }
    }
}
