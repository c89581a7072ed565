//! Task handlers and their registry.
//!
//! A handler receives a claimed task and reports what happened through
//! [`HandlerOutcome`]; it never writes task status itself. The worker maps
//! the outcome onto the queue's complete/fail/postpone operations.

mod image_analysis;
mod text_analysis;

pub use image_analysis::ImageAnalysisHandler;
pub use text_analysis::TextAnalysisHandler;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::models::Task;

/// What a handler invocation produced.
#[derive(Debug)]
pub enum HandlerOutcome {
    /// Work done; the value is stored as the task result.
    Success(Option<serde_json::Value>),
    /// Recoverable failure, should be retried against the budget.
    Retry(String),
    /// Unrecoverable failure, retrying would never help.
    Permanent(String),
    /// Not ready yet (dependency pending); re-run after the delay with no
    /// retry charged.
    Postpone(Duration),
}

/// A unit of executable work keyed by task type.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Registry key. Must match [`crate::models::TaskPayload::task_type`].
    fn task_type(&self) -> &'static str;

    /// Run the task. Panics and hangs are contained by the worker, not here.
    async fn execute(&self, task: &Task) -> HandlerOutcome;
}

/// Dispatch table from task type to handler.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(handler.task_type(), handler);
    }

    pub fn get(&self, task_type: &str) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(task_type)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
