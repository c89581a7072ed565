//! Worker pool lifecycle: spawn N pollers, drain them on shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::handlers::HandlerRegistry;
use super::worker::{Worker, WorkerConfig};
use super::TaskQueue;
use crate::config::Settings;

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub workers: usize,
    /// How long shutdown waits for in-flight handlers before aborting.
    pub shutdown_grace: Duration,
    pub worker: WorkerConfig,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            shutdown_grace: Duration::from_secs(10),
            worker: WorkerConfig::default(),
        }
    }
}

impl WorkerPoolConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            workers: settings.worker.workers,
            shutdown_grace: settings.shutdown_grace(),
            worker: WorkerConfig::from_settings(settings),
        }
    }
}

/// A running set of workers sharing one queue and one handler registry.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    grace: Duration,
}

impl WorkerPool {
    /// Spawn the workers. Worker 0 is the designated maintenance worker.
    pub fn start(
        queue: Arc<TaskQueue>,
        registry: Arc<HandlerRegistry>,
        config: WorkerPoolConfig,
    ) -> Self {
        let workers = config.workers.max(1);
        let grace = config.shutdown_grace;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handles = (0..workers)
            .map(|id| {
                let worker = Worker::new(
                    id,
                    Arc::clone(&queue),
                    Arc::clone(&registry),
                    config.worker.clone(),
                    shutdown_rx.clone(),
                    id == 0,
                );
                tokio::spawn(worker.run())
            })
            .collect();

        info!(workers, "worker pool started");
        Self {
            shutdown_tx,
            handles,
            grace,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Signal shutdown and wait for workers to drain.
    ///
    /// Workers finish their in-flight handler and exit; anything still
    /// running past the grace window is aborted and left for the stuck-task
    /// recovery pass on next start.
    pub async fn shutdown(mut self) {
        info!("stopping worker pool");
        let _ = self.shutdown_tx.send(true);

        let deadline = tokio::time::Instant::now() + self.grace;
        for (id, handle) in self.handles.iter_mut().enumerate() {
            match tokio::time::timeout_at(deadline, &mut *handle).await {
                Ok(_) => {}
                Err(_) => {
                    warn!(worker = id, "worker did not drain in time, aborting");
                    handle.abort();
                }
            }
        }
        info!("worker pool stopped");
    }
}
