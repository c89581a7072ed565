//! LLM client implementation for insight analysis.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::{LlmConfig, LlmProvider};
use super::prompts::{IMAGE_ANALYSIS_PROMPT, IMAGE_CONTEXT_SECTION, TEXT_ANALYSIS_PROMPT};
use super::{AnalysisProvider, LlmError};
use crate::models::InsightAnalysis;

/// LLM client for insight analysis.
pub struct LlmClient {
    config: LlmConfig,
    client: Client,
}

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama API response format.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

/// OpenAI-compatible chat response (only the fields we read).
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Analysis fields as the model emits them, before validation.
#[derive(Debug, Deserialize)]
struct RawAnalysis {
    summary: String,
    action: String,
    confidence: f64,
    #[serde(default)]
    event_time: Option<String>,
    #[serde(default)]
    levels: Option<serde_json::Value>,
}

impl LlmClient {
    /// Create a new LLM client with the given configuration.
    pub fn new(config: LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    /// Get the config.
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Check if the LLM service is reachable.
    pub async fn is_available(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let url = match self.config.provider {
            LlmProvider::Ollama => format!("{}/api/tags", self.config.endpoint),
            LlmProvider::OpenAI => format!("{}/v1/models", self.config.endpoint),
        };
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Truncate content to configured maximum (UTF-8 safe).
    fn truncate_content<'a>(&self, text: &'a str) -> &'a str {
        if text.len() <= self.config.max_content_chars {
            return text;
        }
        let mut end = self.config.max_content_chars;
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        &text[..end]
    }

    /// Call the Ollama generate API.
    async fn call_ollama(
        &self,
        model: &str,
        prompt: &str,
        images: Option<Vec<String>>,
    ) -> Result<String, LlmError> {
        let request = OllamaRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: false,
            images,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.config.endpoint);
        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        let ollama_resp: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        Ok(ollama_resp.response)
    }

    /// Call an OpenAI-compatible chat completions API.
    ///
    /// `image_url` attaches an image content part for multimodal models.
    async fn call_openai(
        &self,
        model: &str,
        prompt: &str,
        image_url: Option<&str>,
    ) -> Result<String, LlmError> {
        let content = match image_url {
            Some(url) => serde_json::json!([
                { "type": "text", "text": prompt },
                { "type": "image_url", "image_url": { "url": url } },
            ]),
            None => serde_json::json!(prompt),
        };

        let request = serde_json::json!({
            "model": model,
            "messages": [{ "role": "user", "content": content }],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        let url = format!("{}/v1/chat/completions", self.config.endpoint);
        let mut req = self.client.post(&url).json(&request);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        let chat: ChatResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Parse("Empty chat response".to_string()))
    }

    /// Download an image and base64-encode it for the Ollama images field.
    async fn fetch_image_base64(&self, image_url: &str) -> Result<String, LlmError> {
        let resp = self
            .client
            .get(image_url)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(LlmError::Api(format!(
                "image fetch HTTP {}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;
        Ok(BASE64.encode(&bytes))
    }

    fn parse_analysis(&self, response: &str) -> Result<InsightAnalysis, LlmError> {
        let json = extract_json_object(response)
            .ok_or_else(|| LlmError::Parse("No JSON object in response".to_string()))?;

        let raw: RawAnalysis = serde_json::from_str(json)
            .map_err(|e| LlmError::Parse(format!("Malformed analysis JSON: {}", e)))?;

        if raw.summary.trim().is_empty() {
            return Err(LlmError::Parse("Empty summary in response".to_string()));
        }

        let event_time = raw.event_time.as_deref().and_then(|s| {
            chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&chrono::Utc))
        });

        Ok(InsightAnalysis {
            summary: raw.summary.trim().to_string(),
            action: raw.action.trim().to_lowercase(),
            confidence: raw.confidence.clamp(0.0, 1.0),
            event_time,
            levels: raw.levels.filter(|l| !l.is_null()),
        })
    }
}

/// Extract the first balanced top-level JSON object from model output.
/// Models often wrap the JSON in prose or markdown fences.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[async_trait]
impl AnalysisProvider for LlmClient {
    async fn analyze_image(
        &self,
        symbol: &str,
        image_url: &str,
    ) -> Result<Option<String>, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }

        let prompt = IMAGE_ANALYSIS_PROMPT.replace("{symbol}", symbol);
        debug!("Analyzing chart image for {}", symbol);

        let response = match self.config.provider {
            LlmProvider::Ollama => {
                let image = self.fetch_image_base64(image_url).await?;
                self.call_ollama(&self.config.vision_model, &prompt, Some(vec![image]))
                    .await?
            }
            LlmProvider::OpenAI => {
                self.call_openai(&self.config.vision_model, &prompt, Some(image_url))
                    .await?
            }
        };

        let description = response.trim();
        if description.is_empty() {
            return Ok(None);
        }
        Ok(Some(description.to_string()))
    }

    async fn analyze_text(
        &self,
        text: &str,
        context: Option<&str>,
    ) -> Result<InsightAnalysis, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }

        let context_section = match context {
            Some(ctx) => IMAGE_CONTEXT_SECTION.replace("{image_context}", ctx),
            None => String::new(),
        };
        let prompt = TEXT_ANALYSIS_PROMPT
            .replace("{content}", self.truncate_content(text))
            .replace("{context}", &context_section);

        let response = match self.config.provider {
            LlmProvider::Ollama => {
                self.call_ollama(&self.config.model, &prompt, None).await?
            }
            LlmProvider::OpenAI => self.call_openai(&self.config.model, &prompt, None).await?,
        };

        self.parse_analysis(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_object() {
        assert_eq!(extract_json_object(r#"{"a": 1}"#), Some(r#"{"a": 1}"#));
        assert_eq!(
            extract_json_object("Here you go:\n```json\n{\"a\": {\"b\": 2}}\n```"),
            Some(r#"{"a": {"b": 2}}"#)
        );
        assert_eq!(
            extract_json_object(r#"{"s": "brace } in string"} trailing"#),
            Some(r#"{"s": "brace } in string"}"#)
        );
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn test_parse_analysis() {
        let client = LlmClient::new(LlmConfig::default());
        let response = r#"Sure! {"summary": "Shares rallied after earnings.",
            "action": "Buy", "confidence": 1.7,
            "event_time": "2026-08-20T14:30:00Z",
            "levels": {"support": 180.0, "resistance": null}}"#;

        let analysis = client.parse_analysis(response).unwrap();
        assert_eq!(analysis.summary, "Shares rallied after earnings.");
        assert_eq!(analysis.action, "buy");
        // Confidence is clamped into [0, 1]
        assert_eq!(analysis.confidence, 1.0);
        assert!(analysis.event_time.is_some());
        assert!(analysis.levels.is_some());
    }

    #[test]
    fn test_parse_analysis_null_levels_dropped() {
        let client = LlmClient::new(LlmConfig::default());
        let response =
            r#"{"summary": "Quiet day.", "action": "hold", "confidence": 0.4, "levels": null}"#;
        let analysis = client.parse_analysis(response).unwrap();
        assert!(analysis.levels.is_none());
        assert!(analysis.event_time.is_none());
    }

    #[test]
    fn test_parse_analysis_rejects_empty_summary() {
        let client = LlmClient::new(LlmConfig::default());
        let response = r#"{"summary": "  ", "action": "hold", "confidence": 0.5}"#;
        assert!(client.parse_analysis(response).is_err());
    }

    #[test]
    fn test_truncate_content_utf8_boundary() {
        let config = LlmConfig {
            max_content_chars: 5,
            ..Default::default()
        };
        let client = LlmClient::new(config);
        // Multi-byte char straddles the limit; truncation backs off to a boundary
        let truncated = client.truncate_content("abcd€fgh");
        assert!(truncated.len() <= 5);
        assert!("abcd€fgh".starts_with(truncated));
    }
}
