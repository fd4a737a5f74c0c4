//! Anthropic Messages API provider.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::error::{RaidoError, Result};

use super::{ChatProvider, GenParams, Generation, Usage};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for the Anthropic Messages API.
pub struct AnthropicProvider {
    api_key: String,
    params: GenParams,
    client: Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.params.model)
            .finish()
    }
}

impl AnthropicProvider {
    pub fn new(api_key: &str, params: GenParams) -> Self {
        Self {
            api_key: api_key.to_string(),
            params,
            client: build_client(),
        }
    }

    /// Build the `messages` request body for a single user prompt.
    fn build_request_body(&self, prompt: &str) -> Value {
        let mut body = json!({
            "model": self.params.model,
            "max_tokens": self.params.max_tokens,
            "temperature": self.params.temperature,
            "messages": [{ "role": "user", "content": prompt }]
        });
        if let Some(system) = &self.params.system_prompt {
            body["system"] = json!(system);
        }
        body
    }

    /// Join the text blocks of a response. Non-text blocks are skipped.
    fn extract_text(response: &Value) -> Option<String> {
        let blocks = response["content"].as_array()?;
        let parts: Vec<&str> = blocks
            .iter()
            .filter(|b| b["type"].as_str() == Some("text"))
            .filter_map(|b| b["text"].as_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(""))
        }
    }

    fn extract_usage(response: &Value) -> Option<Usage> {
        let usage = response.get("usage")?;
        let prompt = usage["input_tokens"].as_u64()? as u32;
        let completion = usage["output_tokens"].as_u64()? as u32;
        Some(Usage::new(prompt, completion))
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    async fn generate(&self, prompt: &str) -> Result<Generation> {
        let body = self.build_request_body(prompt);
        debug!(model = %self.params.model, "Anthropic request");

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RaidoError::Provider(format!("Anthropic request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RaidoError::Provider(api_error_message(
                "Anthropic",
                status,
                &error_text,
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| RaidoError::Provider(format!("Failed to parse Anthropic response: {}", e)))?;

        let text = Self::extract_text(&json).ok_or_else(|| {
            RaidoError::Provider("Anthropic response contained no text content".into())
        })?;

        let mut generation = Generation::text(text);
        if let Some(usage) = Self::extract_usage(&json) {
            generation = generation.with_usage(usage);
        }
        Ok(generation)
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.params.model
    }
}

pub(super) fn build_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .expect("failed to build HTTP client")
}

/// Extract a useful message from a provider error body.
///
/// Both Anthropic and OpenAI wrap errors as `{"error": {"message": ...}}`;
/// anything else falls back to the raw body with the HTTP status.
pub(super) fn api_error_message(provider: &str, status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v["error"]["message"]
                .as_str()
                .map(|msg| format!("{} API error ({}): {}", provider, status, msg))
        })
        .unwrap_or_else(|| format!("{} API error ({}): {}", provider, status, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmDefaults;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new("test-key", GenParams::from_defaults(&LlmDefaults::default()))
    }

    #[test]
    fn test_build_request_body() {
        let body = provider().build_request_body("Hello");
        assert_eq!(body["model"], "claude-3-haiku-20240307");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Hello");
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_build_request_body_with_system_prompt() {
        let params = GenParams::from_defaults(&LlmDefaults::default())
            .with_system_prompt("You are terse.");
        let provider = AnthropicProvider::new("k", params);
        let body = provider.build_request_body("Hi");
        assert_eq!(body["system"], "You are terse.");
    }

    #[test]
    fn test_extract_text_joins_blocks() {
        let response = json!({
            "content": [
                { "type": "text", "text": "Part one. " },
                { "type": "tool_use", "id": "t1", "name": "x", "input": {} },
                { "type": "text", "text": "Part two." }
            ]
        });
        assert_eq!(
            AnthropicProvider::extract_text(&response).as_deref(),
            Some("Part one. Part two.")
        );
    }

    #[test]
    fn test_extract_text_none_for_empty_content() {
        let response = json!({ "content": [] });
        assert!(AnthropicProvider::extract_text(&response).is_none());
    }

    #[test]
    fn test_extract_usage() {
        let response = json!({
            "content": [{ "type": "text", "text": "hi" }],
            "usage": { "input_tokens": 12, "output_tokens": 4 }
        });
        let usage = AnthropicProvider::extract_usage(&response).unwrap();
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.completion_tokens, 4);
        assert_eq!(usage.total_tokens, 16);
    }

    #[test]
    fn test_extract_usage_none_when_missing() {
        let response = json!({ "content": [{ "type": "text", "text": "hi" }] });
        assert!(AnthropicProvider::extract_usage(&response).is_none());
    }

    #[test]
    fn test_api_error_message_parses_body() {
        let body = r#"{"error": {"type": "invalid_request_error", "message": "max_tokens required"}}"#;
        let message = api_error_message("Anthropic", 400, body);
        assert_eq!(message, "Anthropic API error (400): max_tokens required");
    }

    #[test]
    fn test_api_error_message_raw_fallback() {
        let message = api_error_message("Anthropic", 502, "bad gateway");
        assert_eq!(message, "Anthropic API error (502): bad gateway");
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let rendered = format!("{:?}", provider());
        assert!(!rendered.contains("test-key"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_provider_name_and_model() {
        let provider = provider();
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.model(), "claude-3-haiku-20240307");
    }
}
