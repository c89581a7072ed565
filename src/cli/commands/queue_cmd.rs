//! Queue inspection and maintenance commands.

use super::helpers::open_queue;
use crate::config::Settings;

/// Show task counts by status.
pub async fn cmd_queue_stats(settings: &Settings) -> anyhow::Result<()> {
    let (_ctx, queue) = open_queue(settings).await?;
    let stats = queue.get_stats().await?;

    println!("Task queue:");
    println!("  pending     {}", stats.pending);
    println!("  processing  {}", stats.processing);
    println!("  completed   {}", stats.completed);
    println!("  failed      {}", stats.failed);
    println!("  cancelled   {}", stats.cancelled);
    println!("  total       {}", stats.total());
    Ok(())
}

/// Show queue health.
pub async fn cmd_queue_health(settings: &Settings) -> anyhow::Result<()> {
    let (_ctx, queue) = open_queue(settings).await?;
    let health = queue.get_health().await?;

    println!(
        "Queue is {} (failure rate {:.1}%, threshold {:.1}%)",
        health.status.as_str(),
        health.failure_rate * 100.0,
        queue.config().health_failure_threshold * 100.0
    );
    Ok(())
}

/// Run the full maintenance pass.
pub async fn cmd_queue_cleanup(settings: &Settings) -> anyhow::Result<()> {
    let (_ctx, queue) = open_queue(settings).await?;
    queue.run_maintenance().await?;
    println!("Maintenance pass complete");
    Ok(())
}

/// Recover tasks stuck in processing.
pub async fn cmd_queue_reset_stuck(settings: &Settings) -> anyhow::Result<()> {
    let (_ctx, queue) = open_queue(settings).await?;
    let count = queue.reset_stuck(queue.config().processing_timeout).await?;
    println!("Reset {} stuck tasks", count);
    Ok(())
}

/// Cancel all active tasks.
pub async fn cmd_queue_cancel(settings: &Settings) -> anyhow::Result<()> {
    let (_ctx, queue) = open_queue(settings).await?;
    let count = queue.cancel_all().await?;
    println!("Cancelled {} tasks", count);
    Ok(())
}

/// Cancel tasks whose insight no longer exists.
pub async fn cmd_queue_purge(settings: &Settings) -> anyhow::Result<()> {
    let (_ctx, queue) = open_queue(settings).await?;
    let count = queue.purge_invalid().await?;
    println!("Purged {} orphaned tasks", count);
    Ok(())
}
