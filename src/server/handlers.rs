//! API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use super::AppState;
use crate::models::InsightStatus;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Filter by insight status (new, processing, completed, failed).
    pub status: Option<String>,
    pub limit: Option<i64>,
}

/// GET /api/insights
pub async fn list_insights(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let status = match params.status.as_deref() {
        Some(s) => match InsightStatus::from_str(s) {
            Some(status) => Some(status),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    format!("unknown status '{}'", s),
                )
                    .into_response()
            }
        },
        None => None,
    };
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);

    match state.insights.list(status, limit).await {
        Ok(insights) => axum::Json(insights).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// GET /api/insights/:id
pub async fn get_insight(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> impl IntoResponse {
    match state.insights.get_by_id(id).await {
        Ok(Some(insight)) => axum::Json(insight).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "insight not found").into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// DELETE /api/insights/:id
///
/// Tasks still referencing the insight are cancelled by the queue's orphan
/// purge, not here.
pub async fn delete_insight(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> impl IntoResponse {
    match state.insights.delete(id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, "insight not found").into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// POST /api/insights/:id/analyze
pub async fn analyze_insight(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> impl IntoResponse {
    let insight = match state.insights.get_by_id(id).await {
        Ok(Some(insight)) => insight,
        Ok(None) => return (StatusCode::NOT_FOUND, "insight not found").into_response(),
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    match state.trigger.trigger_insight(&insight).await {
        Ok(task_ids) => axum::Json(serde_json::json!({
            "insight_id": id,
            "task_ids": task_ids,
        }))
        .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// POST /api/analyze - trigger analysis for every unprocessed insight.
pub async fn analyze_pending(State(state): State<AppState>) -> impl IntoResponse {
    match state.trigger.trigger_pending(1000).await {
        Ok(count) => axum::Json(serde_json::json!({ "triggered": count })).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct IngestParams {
    pub url: String,
}

/// POST /api/ingest?url=... - pull a feed and enqueue analysis.
pub async fn ingest_feed(
    State(state): State<AppState>,
    Query(params): Query<IngestParams>,
) -> impl IntoResponse {
    match state.ingest.ingest(&params.url).await {
        Ok(report) => axum::Json(report).into_response(),
        Err(e) => (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
    }
}

/// GET /api/queue/stats
pub async fn queue_stats(State(state): State<AppState>) -> impl IntoResponse {
    match state.queue.get_stats().await {
        Ok(stats) => axum::Json(stats).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// GET /api/queue/health
pub async fn queue_health(State(state): State<AppState>) -> impl IntoResponse {
    match state.queue.get_health().await {
        Ok(health) => axum::Json(health).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// POST /api/queue/cleanup - run the full maintenance pass now.
pub async fn queue_cleanup(State(state): State<AppState>) -> impl IntoResponse {
    match state.queue.run_maintenance().await {
        Ok(()) => axum::Json(serde_json::json!({ "status": "ok" })).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// POST /api/queue/reset-stuck
pub async fn queue_reset_stuck(State(state): State<AppState>) -> impl IntoResponse {
    let timeout = state.queue.config().processing_timeout;
    match state.queue.reset_stuck(timeout).await {
        Ok(count) => axum::Json(serde_json::json!({ "reset": count })).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// POST /api/queue/cancel - cancel all active tasks.
pub async fn queue_cancel(State(state): State<AppState>) -> impl IntoResponse {
    match state.queue.cancel_all().await {
        Ok(count) => axum::Json(serde_json::json!({ "cancelled": count })).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// POST /api/queue/purge-invalid - cancel tasks whose insight is gone.
pub async fn queue_purge_invalid(State(state): State<AppState>) -> impl IntoResponse {
    match state.queue.purge_invalid().await {
        Ok(count) => axum::Json(serde_json::json!({ "purged": count })).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
