//! LLM client configuration.

use serde::{Deserialize, Serialize};

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Ollama API (local, default)
    #[default]
    Ollama,
    /// OpenAI-compatible API (OpenAI, Groq, Together.ai, etc.)
    OpenAI,
}

/// Configuration for the LLM client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Whether LLM analysis is enabled
    pub enabled: bool,
    /// LLM provider (ollama or openai)
    pub provider: LlmProvider,
    /// API endpoint (provider-specific defaults apply)
    pub endpoint: String,
    /// API key for OpenAI-compatible providers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model used for text analysis
    pub model: String,
    /// Model used for image analysis (multimodal)
    pub vision_model: String,
    /// Maximum tokens in response
    pub max_tokens: u32,
    /// Temperature for generation (0.0 - 1.0)
    pub temperature: f32,
    /// Maximum characters of insight content sent to the LLM
    pub max_content_chars: usize,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: LlmProvider::Ollama,
            endpoint: "http://localhost:11434".to_string(),
            api_key: None,
            model: "llama3.1:8b".to_string(),
            vision_model: "llava:13b".to_string(),
            max_tokens: 512,
            temperature: 0.2,
            max_content_chars: 8000,
            request_timeout_secs: 300,
        }
    }
}
