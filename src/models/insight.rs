//! Insight models - finance news items and their analysis state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Analysis status of an insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightStatus {
    /// Ingested, analysis not yet started.
    New,
    /// An analysis task is running for this insight.
    Processing,
    /// Analysis finished and results are stored.
    Completed,
    /// Analysis failed permanently.
    Failed,
}

impl InsightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A finance news item pulled from an external feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: i32,
    /// Ticker symbol the item refers to (e.g. "AAPL").
    pub symbol: String,
    pub title: String,
    /// Raw article/post text.
    pub content: String,
    /// Canonical source URL, used for deduplication on ingest.
    pub source_url: String,
    /// Attached chart image, when the source provides one.
    pub image_url: Option<String>,
    pub status: InsightStatus,
    /// LLM-produced summary.
    pub summary: Option<String>,
    /// Suggested action ("buy", "sell", "hold", "watch").
    pub action: Option<String>,
    /// Model confidence in [0, 1].
    pub confidence: Option<f64>,
    /// When the described event happens/happened.
    pub event_time: Option<DateTime<Utc>>,
    /// Price levels mentioned in the analysis, as JSON.
    pub levels: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a new insight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInsight {
    pub symbol: String,
    pub title: String,
    pub content: String,
    pub source_url: String,
    pub image_url: Option<String>,
}

/// Structured result of LLM text analysis, persisted onto the insight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightAnalysis {
    pub summary: String,
    pub action: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<serde_json::Value>,
}
