//! Background task models for the persistent work queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task lifecycle status.
///
/// `Completed`, `Failed` and `Cancelled` are terminal; transitions happen
/// only through the queue's claim/complete/fail operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether this status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Task type string constants (keys into the handler registry).
pub mod task_types {
    pub const IMAGE_ANALYSIS: &str = "image_analysis";
    pub const TEXT_ANALYSIS: &str = "text_analysis";
}

/// Typed payload for a background task.
///
/// Each variant declares the exact fields its handler expects. Payloads are
/// stored as JSON in the task row and deserialized at the worker boundary;
/// a schema mismatch is a permanent failure, not a retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Describe the chart image attached to an insight.
    ImageAnalysis {
        insight_id: i32,
        symbol: String,
        image_url: String,
    },
    /// Analyze insight text, optionally gated on a prior image-analysis task.
    TextAnalysis {
        insight_id: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        depends_on: Option<String>,
        #[serde(default)]
        requires_image_analysis: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_context: Option<String>,
    },
}

impl TaskPayload {
    /// Handler registry key for this payload.
    pub fn task_type(&self) -> &'static str {
        match self {
            Self::ImageAnalysis { .. } => task_types::IMAGE_ANALYSIS,
            Self::TextAnalysis { .. } => task_types::TEXT_ANALYSIS,
        }
    }

    /// The insight this payload operates on.
    pub fn insight_id(&self) -> i32 {
        match self {
            Self::ImageAnalysis { insight_id, .. } => *insight_id,
            Self::TextAnalysis { insight_id, .. } => *insight_id,
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }
}

/// A unit of background work persisted in the `tasks` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Opaque unique identifier (UUID v4), assigned at enqueue.
    pub id: String,
    /// Key into the handler registry.
    pub task_type: String,
    /// Task-specific arguments as JSON (see [`TaskPayload`]).
    pub payload: serde_json::Value,
    pub status: TaskStatus,
    /// Attempts so far.
    pub retries: u32,
    /// Retry ceiling before permanent failure.
    pub max_retries: u32,
    /// Higher claims first. Retries are demoted below fresh work.
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    /// Stamped on claim, cleared on each retry.
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Backoff gate: the task is invisible to claiming until this passes.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Populated on success.
    pub result: Option<serde_json::Value>,
    /// Populated on failure (kept across retries for visibility).
    pub error: Option<String>,
    /// Optional entity back-reference for status cascades and orphan detection.
    pub entity_type: Option<String>,
    pub entity_id: Option<i32>,
}

impl Task {
    /// Deserialize the typed payload, if it matches a known schema.
    pub fn typed_payload(&self) -> Result<TaskPayload, serde_json::Error> {
        TaskPayload::from_value(&self.payload)
    }
}

/// Entity type string used for insight-linked tasks.
pub const ENTITY_INSIGHT: &str = "insight";

/// Task counts by status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TaskStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl TaskStats {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed + self.cancelled
    }
}

/// Queue health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Critical => "critical",
        }
    }
}

/// Snapshot of queue health for the introspection API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueHealth {
    pub status: HealthStatus,
    /// Failed tasks as a fraction of all tasks ever recorded.
    pub failure_rate: f64,
    pub stats: TaskStats,
}
