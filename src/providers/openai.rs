//! OpenAI chat completions provider.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{RaidoError, Result};

use super::anthropic::{api_error_message, build_client};
use super::{ChatProvider, GenParams, Generation, Usage};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Client for the OpenAI chat completions API.
pub struct OpenAiProvider {
    api_key: String,
    params: GenParams,
    client: Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.params.model)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(api_key: &str, params: GenParams) -> Self {
        Self {
            api_key: api_key.to_string(),
            params,
            client: build_client(),
        }
    }

    /// Build the chat completions request body for a single user prompt.
    ///
    /// The system prompt, when configured, leads the message list.
    fn build_request_body(&self, prompt: &str) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &self.params.system_prompt {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        json!({
            "model": self.params.model,
            "messages": messages,
            "max_tokens": self.params.max_tokens,
            "temperature": self.params.temperature
        })
    }

    fn extract_text(response: &Value) -> Option<String> {
        response["choices"][0]["message"]["content"]
            .as_str()
            .map(String::from)
    }

    fn extract_usage(response: &Value) -> Option<Usage> {
        let usage = response.get("usage")?;
        let prompt = usage["prompt_tokens"].as_u64()? as u32;
        let completion = usage["completion_tokens"].as_u64()? as u32;
        Some(Usage::new(prompt, completion))
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn generate(&self, prompt: &str) -> Result<Generation> {
        let body = self.build_request_body(prompt);
        debug!(model = %self.params.model, "OpenAI request");

        let response = self
            .client
            .post(OPENAI_API_URL)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RaidoError::Provider(format!("OpenAI request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RaidoError::Provider(api_error_message(
                "OpenAI",
                status,
                &error_text,
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| RaidoError::Provider(format!("Failed to parse OpenAI response: {}", e)))?;

        let text = Self::extract_text(&json).ok_or_else(|| {
            RaidoError::Provider("OpenAI response contained no message content".into())
        })?;

        let mut generation = Generation::text(text);
        if let Some(usage) = Self::extract_usage(&json) {
            generation = generation.with_usage(usage);
        }
        Ok(generation)
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.params.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmDefaults;

    fn params() -> GenParams {
        GenParams {
            model: "gpt-4o-mini".to_string(),
            ..GenParams::from_defaults(&LlmDefaults::default())
        }
    }

    #[test]
    fn test_build_request_body_without_system() {
        let provider = OpenAiProvider::new("k", params());
        let body = provider.build_request_body("Hello");
        assert_eq!(body["model"], "gpt-4o-mini");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "Hello");
    }

    #[test]
    fn test_build_request_body_system_leads() {
        let provider = OpenAiProvider::new("k", params().with_system_prompt("Be brief."));
        let body = provider.build_request_body("Hello");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "Be brief.");
        assert_eq!(messages[1]["role"], "user");
    }

    #[test]
    fn test_extract_text() {
        let response = json!({
            "choices": [{ "message": { "role": "assistant", "content": "Hi there" } }]
        });
        assert_eq!(
            OpenAiProvider::extract_text(&response).as_deref(),
            Some("Hi there")
        );
    }

    #[test]
    fn test_extract_text_none_for_missing_choices() {
        let response = json!({ "choices": [] });
        assert!(OpenAiProvider::extract_text(&response).is_none());
    }

    #[test]
    fn test_extract_usage() {
        let response = json!({
            "choices": [{ "message": { "content": "hi" } }],
            "usage": { "prompt_tokens": 7, "completion_tokens": 3, "total_tokens": 10 }
        });
        let usage = OpenAiProvider::extract_usage(&response).unwrap();
        assert_eq!(usage.prompt_tokens, 7);
        assert_eq!(usage.completion_tokens, 3);
        assert_eq!(usage.total_tokens, 10);
    }

    #[test]
    fn test_provider_name_and_model() {
        let provider = OpenAiProvider::new("k", params());
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.model(), "gpt-4o-mini");
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let provider = OpenAiProvider::new("sk-secret", params());
        let rendered = format!("{:?}", provider);
        assert!(!rendered.contains("sk-secret"));
    }
}
