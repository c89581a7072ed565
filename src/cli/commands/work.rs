//! Worker pool command.

use std::sync::Arc;

use super::helpers::{build_registry, open_queue};
use crate::config::Settings;
use crate::queue::{WorkerPool, WorkerPoolConfig};

/// Run the worker pool until interrupted.
pub async fn cmd_work(settings: &Settings, workers: Option<usize>) -> anyhow::Result<()> {
    let (ctx, queue) = open_queue(settings).await?;
    let registry = Arc::new(build_registry(settings, &ctx));

    let mut pool_config = WorkerPoolConfig::from_settings(settings);
    if let Some(workers) = workers {
        pool_config.workers = workers;
    }

    let pool = WorkerPool::start(queue, registry, pool_config);
    println!("Running {} workers, press Ctrl+C to stop", pool.worker_count());

    tokio::signal::ctrl_c().await?;
    pool.shutdown().await;
    Ok(())
}
