//! API server command: HTTP surface plus the worker pool in one process.

use std::sync::Arc;

use super::helpers::{build_registry, open_queue};
use crate::config::Settings;
use crate::queue::{WorkerPool, WorkerPoolConfig};
use crate::server::AppState;

/// Serve the API and run workers until interrupted.
pub async fn cmd_serve(settings: &Settings, bind: Option<&str>) -> anyhow::Result<()> {
    let (ctx, queue) = open_queue(settings).await?;
    let registry = Arc::new(build_registry(settings, &ctx));
    let pool = WorkerPool::start(
        Arc::clone(&queue),
        registry,
        WorkerPoolConfig::from_settings(settings),
    );

    let bind_address = bind
        .map(str::to_string)
        .unwrap_or_else(|| settings.bind_address());
    let state = AppState::new(settings);

    println!(
        "Serving API at http://{} with {} workers, press Ctrl+C to stop",
        bind_address,
        pool.worker_count()
    );

    let server = tokio::spawn(async move { crate::server::serve(state, &bind_address).await });

    tokio::select! {
        result = server => {
            result??;
        }
        _ = tokio::signal::ctrl_c() => {}
    }

    pool.shutdown().await;
    Ok(())
}
