//! Worker loop: claim, dispatch, report back.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::handlers::{HandlerOutcome, HandlerRegistry};
use super::TaskQueue;
use crate::config::Settings;
use crate::models::Task;

/// Per-worker loop timing.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
    /// Hard ceiling on a single handler invocation.
    pub handler_timeout: Duration,
    /// Poll iterations between maintenance passes on the designated worker.
    pub maintenance_every: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            handler_timeout: Duration::from_secs(120),
            maintenance_every: 120,
        }
    }
}

impl WorkerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            handler_timeout: settings.handler_timeout(),
            maintenance_every: settings.worker.maintenance_every,
        }
    }
}

/// A single polling worker.
///
/// Workers never mutate task rows directly: they claim through the queue,
/// run the handler with a timeout, and map the outcome back onto the
/// queue's complete/fail/postpone operations. A handler that panics or
/// hangs costs one retry, never the worker.
pub struct Worker {
    id: usize,
    queue: Arc<TaskQueue>,
    registry: Arc<HandlerRegistry>,
    config: WorkerConfig,
    shutdown: watch::Receiver<bool>,
    /// Exactly one worker per pool runs the periodic maintenance pass.
    maintenance: bool,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: Arc<TaskQueue>,
        registry: Arc<HandlerRegistry>,
        config: WorkerConfig,
        shutdown: watch::Receiver<bool>,
        maintenance: bool,
    ) -> Self {
        Self {
            id,
            queue,
            registry,
            config,
            shutdown,
            maintenance,
        }
    }

    /// Poll until shutdown is signalled. An in-flight handler finishes
    /// before the loop exits; unclaimed tasks stay pending for the next
    /// start.
    pub async fn run(mut self) {
        info!(worker = self.id, maintenance = self.maintenance, "worker started");
        let mut iterations: u64 = 0;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            if self.maintenance && iterations % self.config.maintenance_every == 0 {
                if let Err(e) = self.queue.run_maintenance().await {
                    warn!(worker = self.id, "maintenance pass failed: {}", e);
                }
            }
            iterations += 1;

            match self.queue.claim_next().await {
                Ok(Some(task)) => self.dispatch(task).await,
                Ok(None) => self.idle().await,
                Err(e) => {
                    warn!(worker = self.id, "claim failed: {}", e);
                    self.idle().await;
                }
            }
        }

        info!(worker = self.id, "worker stopped");
    }

    /// Sleep for one poll interval, waking early on shutdown.
    async fn idle(&mut self) {
        tokio::select! {
            _ = tokio::time::sleep(self.config.poll_interval) => {}
            _ = self.shutdown.changed() => {}
        }
    }

    async fn dispatch(&self, task: Task) {
        let Some(handler) = self.registry.get(&task.task_type) else {
            error!(worker = self.id, task_id = %task.id, task_type = %task.task_type,
                "no handler registered");
            let error = format!("no handler registered for task type '{}'", task.task_type);
            if let Err(e) = self.queue.fail(&task.id, &error, true).await {
                error!(task_id = %task.id, "failed to record handler miss: {}", e);
            }
            return;
        };

        debug!(worker = self.id, task_id = %task.id, task_type = %task.task_type,
            retries = task.retries, "executing task");

        // Run the handler on its own spawned task so a panic is contained
        // as a JoinError instead of taking the worker down.
        let handler = Arc::clone(handler);
        let handler_task = task.clone();
        let mut work = tokio::spawn(async move { handler.execute(&handler_task).await });

        let outcome = match tokio::time::timeout(self.config.handler_timeout, &mut work).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) => {
                HandlerOutcome::Retry(format!("handler panicked: {}", join_err))
            }
            Err(_) => {
                work.abort();
                HandlerOutcome::Retry(format!(
                    "handler timed out after {}s",
                    self.config.handler_timeout.as_secs()
                ))
            }
        };

        let applied = match outcome {
            HandlerOutcome::Success(result) => self.queue.complete(&task.id, result).await,
            HandlerOutcome::Retry(error) => self.queue.fail(&task.id, &error, false).await,
            HandlerOutcome::Permanent(error) => self.queue.fail(&task.id, &error, true).await,
            HandlerOutcome::Postpone(delay) => self.queue.postpone(&task.id, delay).await,
        };
        if let Err(e) = applied {
            error!(worker = self.id, task_id = %task.id, "failed to record task outcome: {}", e);
        }
    }
}
