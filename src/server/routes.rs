//! Router configuration for the API server.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the router with all API routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Insights
        .route("/api/insights", get(handlers::list_insights))
        .route("/api/insights/:id", get(handlers::get_insight))
        .route("/api/insights/:id", delete(handlers::delete_insight))
        .route("/api/insights/:id/analyze", post(handlers::analyze_insight))
        // Bulk analysis and ingestion
        .route("/api/analyze", post(handlers::analyze_pending))
        .route("/api/ingest", post(handlers::ingest_feed))
        // Queue introspection and maintenance
        .route("/api/queue/stats", get(handlers::queue_stats))
        .route("/api/queue/health", get(handlers::queue_health))
        .route("/api/queue/cleanup", post(handlers::queue_cleanup))
        .route("/api/queue/reset-stuck", post(handlers::queue_reset_stuck))
        .route("/api/queue/cancel", post(handlers::queue_cancel))
        .route("/api/queue/purge-invalid", post(handlers::queue_purge_invalid))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
