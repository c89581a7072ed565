//! LLM analysis collaborator.
//!
//! Supports Ollama for local inference and OpenAI-compatible APIs.
//! Task handlers consume this through the [`AnalysisProvider`] trait so
//! tests can swap in scripted providers; the production implementation
//! is [`LlmClient`].

mod client;
mod config;
mod prompts;

use async_trait::async_trait;
use thiserror::Error;

pub use client::LlmClient;
pub use config::{LlmConfig, LlmProvider};

use crate::models::InsightAnalysis;

/// Errors from the LLM collaborator.
///
/// Treated as unreliable I/O by handlers: everything except `Disabled`
/// maps to a recoverable failure and goes through the retry budget.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("LLM analysis is disabled")]
    Disabled,
}

/// Boundary contract for insight analysis.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Describe the chart image attached to an insight. `None` when the
    /// model produced no usable description.
    async fn analyze_image(
        &self,
        symbol: &str,
        image_url: &str,
    ) -> Result<Option<String>, LlmError>;

    /// Analyze insight text, optionally with image-derived context.
    async fn analyze_text(
        &self,
        text: &str,
        context: Option<&str>,
    ) -> Result<InsightAnalysis, LlmError>;
}
