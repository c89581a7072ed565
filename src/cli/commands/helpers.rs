//! Shared wiring for commands.

use std::sync::Arc;

use crate::analysis::LlmClient;
use crate::config::Settings;
use crate::queue::handlers::{HandlerRegistry, ImageAnalysisHandler, TextAnalysisHandler};
use crate::queue::{QueueConfig, TaskQueue};
use crate::repository::{migrations, DbContext};

/// Run migrations and build the queue against the configured database.
pub async fn open_queue(settings: &Settings) -> anyhow::Result<(DbContext, Arc<TaskQueue>)> {
    migrations::run_migrations(&settings.database_url()).await?;
    let ctx = settings.create_db_context();
    let queue = Arc::new(TaskQueue::new(
        ctx.tasks(),
        ctx.insights(),
        QueueConfig::from_settings(settings),
    ));
    Ok((ctx, queue))
}

/// Build the handler registry with the production LLM client.
pub fn build_registry(settings: &Settings, ctx: &DbContext) -> HandlerRegistry {
    let provider = Arc::new(LlmClient::new(settings.llm.clone()));

    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(ImageAnalysisHandler::new(
        ctx.insights(),
        provider.clone(),
    )));
    registry.register(Arc::new(TextAnalysisHandler::new(
        ctx.insights(),
        ctx.tasks(),
        provider,
        settings.dependency_delay(),
    )));
    registry
}
