//! Diesel record structs mapping database rows to domain models.
//!
//! Timestamps are stored as RFC 3339 text; payload/result/levels columns
//! hold JSON-encoded text.

use chrono::Utc;
use diesel::prelude::*;

use super::util::{parse_datetime, parse_datetime_opt};
use crate::models::{Insight, InsightStatus, NewInsight, Task, TaskStatus};
use crate::schema::{insights, tasks};

/// Full task row.
#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = tasks)]
pub struct TaskRecord {
    pub id: String,
    pub task_type: String,
    pub payload: String,
    pub status: String,
    pub retries: i32,
    pub max_retries: i32,
    pub priority: i32,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub next_retry_at: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<i32>,
}

impl From<TaskRecord> for Task {
    fn from(record: TaskRecord) -> Self {
        let payload: serde_json::Value =
            serde_json::from_str(&record.payload).unwrap_or_default();
        let result = record
            .result
            .as_deref()
            .and_then(|r| serde_json::from_str(r).ok());

        Task {
            id: record.id,
            task_type: record.task_type,
            payload,
            status: TaskStatus::from_str(&record.status).unwrap_or(TaskStatus::Pending),
            retries: record.retries.max(0) as u32,
            max_retries: record.max_retries.max(0) as u32,
            priority: record.priority,
            created_at: parse_datetime(&record.created_at),
            started_at: parse_datetime_opt(record.started_at),
            completed_at: parse_datetime_opt(record.completed_at),
            next_retry_at: parse_datetime_opt(record.next_retry_at),
            result,
            error: record.error,
            entity_type: record.entity_type,
            entity_id: record.entity_id,
        }
    }
}

impl From<&Task> for TaskRecord {
    fn from(task: &Task) -> Self {
        TaskRecord {
            id: task.id.clone(),
            task_type: task.task_type.clone(),
            payload: task.payload.to_string(),
            status: task.status.as_str().to_string(),
            retries: task.retries as i32,
            max_retries: task.max_retries as i32,
            priority: task.priority,
            created_at: task.created_at.to_rfc3339(),
            started_at: task.started_at.map(|dt| dt.to_rfc3339()),
            completed_at: task.completed_at.map(|dt| dt.to_rfc3339()),
            next_retry_at: task.next_retry_at.map(|dt| dt.to_rfc3339()),
            result: task.result.as_ref().map(|r| r.to_string()),
            error: task.error.clone(),
            entity_type: task.entity_type.clone(),
            entity_id: task.entity_id,
        }
    }
}

/// Full insight row.
#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = insights)]
pub struct InsightRecord {
    pub id: i32,
    pub symbol: String,
    pub title: String,
    pub content: String,
    pub source_url: String,
    pub image_url: Option<String>,
    pub status: String,
    pub summary: Option<String>,
    pub action: Option<String>,
    pub confidence: Option<f64>,
    pub event_time: Option<String>,
    pub levels: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<InsightRecord> for Insight {
    fn from(record: InsightRecord) -> Self {
        let levels = record
            .levels
            .as_deref()
            .and_then(|l| serde_json::from_str(l).ok());

        Insight {
            id: record.id,
            symbol: record.symbol,
            title: record.title,
            content: record.content,
            source_url: record.source_url,
            image_url: record.image_url,
            status: InsightStatus::from_str(&record.status).unwrap_or(InsightStatus::New),
            summary: record.summary,
            action: record.action,
            confidence: record.confidence,
            event_time: parse_datetime_opt(record.event_time),
            levels,
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
        }
    }
}

/// Insert form for a new insight row (id is assigned by SQLite).
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = insights)]
pub struct NewInsightRecord {
    pub symbol: String,
    pub title: String,
    pub content: String,
    pub source_url: String,
    pub image_url: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&NewInsight> for NewInsightRecord {
    fn from(insight: &NewInsight) -> Self {
        let now = Utc::now().to_rfc3339();
        NewInsightRecord {
            symbol: insight.symbol.clone(),
            title: insight.title.clone(),
            content: insight.content.clone(),
            source_url: insight.source_url.clone(),
            image_url: insight.image_url.clone(),
            status: InsightStatus::New.as_str().to_string(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}
