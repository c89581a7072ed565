//! JSON API server for insights and queue introspection.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Settings;
use crate::queue::{QueueConfig, TaskQueue};
use crate::repository::InsightRepository;
use crate::services::{AnalysisTrigger, IngestService};

/// Shared state for the API server.
#[derive(Clone)]
pub struct AppState {
    pub insights: InsightRepository,
    pub queue: Arc<TaskQueue>,
    pub trigger: Arc<AnalysisTrigger>,
    pub ingest: Arc<IngestService>,
}

impl AppState {
    pub fn new(settings: &Settings) -> Self {
        let ctx = settings.create_db_context();
        let queue = Arc::new(TaskQueue::new(
            ctx.tasks(),
            ctx.insights(),
            QueueConfig::from_settings(settings),
        ));
        let trigger = Arc::new(AnalysisTrigger::new(Arc::clone(&queue), ctx.insights()));
        let ingest = Arc::new(IngestService::new(
            ctx.insights(),
            AnalysisTrigger::new(Arc::clone(&queue), ctx.insights()),
        ));

        Self {
            insights: ctx.insights(),
            queue,
            trigger,
            ingest,
        }
    }
}

/// Bind and serve the API until the process exits.
pub async fn serve(state: AppState, bind_address: &str) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr: SocketAddr = bind_address.parse()?;
    tracing::info!("Starting API server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
