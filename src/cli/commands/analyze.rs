//! Bulk analysis trigger command.

use super::helpers::open_queue;
use crate::config::Settings;
use crate::services::AnalysisTrigger;

/// Enqueue analysis for every insight still waiting on it.
pub async fn cmd_analyze(settings: &Settings, limit: i64) -> anyhow::Result<()> {
    let (ctx, queue) = open_queue(settings).await?;
    let trigger = AnalysisTrigger::new(queue, ctx.insights());

    let count = trigger.trigger_pending(limit).await?;
    if count == 0 {
        println!("Nothing to analyze");
    } else {
        println!("Triggered analysis for {} insights", count);
        println!("Run 'finsight work' to process the queue");
    }
    Ok(())
}
