//! Feed ingestion command.

use super::helpers::open_queue;
use crate::config::Settings;
use crate::services::{AnalysisTrigger, IngestService};

/// Pull a news feed and enqueue analysis for anything new.
pub async fn cmd_ingest(settings: &Settings, url: Option<&str>) -> anyhow::Result<()> {
    let url = match url.or(settings.feed.url.as_deref()) {
        Some(url) => url.to_string(),
        None => anyhow::bail!("no feed URL given and none configured under [feed]"),
    };

    let (ctx, queue) = open_queue(settings).await?;
    let trigger = AnalysisTrigger::new(queue, ctx.insights());
    let service = IngestService::new(ctx.insights(), trigger);

    let report = service.ingest(&url).await?;
    println!(
        "Fetched {} items: {} new, {} duplicates, {} tasks enqueued",
        report.fetched, report.created, report.duplicates, report.tasks_enqueued
    );
    Ok(())
}
