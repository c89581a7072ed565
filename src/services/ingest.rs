//! Feed ingestion: pull a JSON feed of news items and enqueue analysis
//! for anything new.

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::trigger::AnalysisTrigger;
use crate::models::NewInsight;
use crate::repository::{DieselError, InsightRepository};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("database error: {0}")]
    Db(#[from] DieselError),
}

/// One item of a JSON news feed.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedItem {
    pub symbol: String,
    pub title: String,
    pub content: String,
    #[serde(alias = "url")]
    pub source_url: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Outcome of one ingest run.
#[derive(Debug, Default, serde::Serialize)]
pub struct IngestReport {
    pub fetched: usize,
    pub created: usize,
    pub duplicates: usize,
    pub tasks_enqueued: usize,
}

/// Pulls a feed, stores new insights, and triggers their analysis.
pub struct IngestService {
    insights: InsightRepository,
    trigger: AnalysisTrigger,
    client: reqwest::Client,
}

impl IngestService {
    pub fn new(insights: InsightRepository, trigger: AnalysisTrigger) -> Self {
        Self {
            insights,
            trigger,
            client: reqwest::Client::new(),
        }
    }

    /// Fetch the feed at `url` and ingest every item.
    pub async fn ingest(&self, url: &str) -> Result<IngestReport, IngestError> {
        debug!(url, "fetching feed");
        let items: Vec<FeedItem> = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let report = self.ingest_items(items).await?;
        info!(
            fetched = report.fetched,
            created = report.created,
            duplicates = report.duplicates,
            "feed ingested"
        );
        Ok(report)
    }

    /// Store feed items, skipping ones already present by source URL.
    pub async fn ingest_items(&self, items: Vec<FeedItem>) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport {
            fetched: items.len(),
            ..Default::default()
        };

        for item in items {
            if item.source_url.is_empty() || item.content.is_empty() {
                warn!(title = %item.title, "skipping feed item with missing fields");
                continue;
            }
            if self
                .insights
                .find_by_source_url(&item.source_url)
                .await?
                .is_some()
            {
                report.duplicates += 1;
                continue;
            }

            let insight = self
                .insights
                .create(&NewInsight {
                    symbol: item.symbol,
                    title: item.title,
                    content: item.content,
                    source_url: item.source_url,
                    image_url: item.image_url,
                })
                .await?;
            report.created += 1;

            let task_ids = self.trigger.trigger_insight(&insight).await?;
            report.tasks_enqueued += task_ids.len();
        }

        Ok(report)
    }
}
