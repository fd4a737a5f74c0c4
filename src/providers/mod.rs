//! LLM provider clients.
//!
//! Each provider speaks its vendor's REST API directly over `reqwest`.
//! Generation parameters are fixed at construction (an agent definition maps
//! to exactly one configured provider instance).

pub mod anthropic;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::LlmDefaults;
use crate::error::{RaidoError, Result};

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A completed generation.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub usage: Option<Usage>,
}

impl Generation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Generation parameters baked into a provider instance.
#[derive(Debug, Clone)]
pub struct GenParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: Option<String>,
}

impl GenParams {
    /// Parameters from the runtime defaults.
    pub fn from_defaults(defaults: &LlmDefaults) -> Self {
        Self {
            model: defaults.model.clone(),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// A chat-completion backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Produce a completion for a single user prompt.
    async fn generate(&self, prompt: &str) -> Result<Generation>;

    /// Provider name used in cache keys and logs.
    fn name(&self) -> &str;

    /// Model this instance is configured for.
    fn model(&self) -> &str;
}

/// Build a provider by name.
pub fn build_provider(
    name: &str,
    api_key: &str,
    params: GenParams,
) -> Result<Arc<dyn ChatProvider>> {
    match name {
        "anthropic" => Ok(Arc::new(AnthropicProvider::new(api_key, params))),
        "openai" => Ok(Arc::new(OpenAiProvider::new(api_key, params))),
        other => Err(RaidoError::Provider(format!(
            "Unknown provider: {} (supported: anthropic, openai)",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_totals() {
        let usage = Usage::new(10, 5);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn test_generation_builder() {
        let generation = Generation::text("hi").with_usage(Usage::new(1, 2));
        assert_eq!(generation.text, "hi");
        assert_eq!(generation.usage.unwrap().total_tokens, 3);
    }

    #[test]
    fn test_gen_params_from_defaults() {
        let params = GenParams::from_defaults(&LlmDefaults::default());
        assert_eq!(params.model, "claude-3-haiku-20240307");
        assert_eq!(params.max_tokens, 1024);
        assert!(params.system_prompt.is_none());
    }

    #[test]
    fn test_build_provider_known_names() {
        let params = GenParams::from_defaults(&LlmDefaults::default());
        let anthropic = build_provider("anthropic", "key", params.clone()).unwrap();
        assert_eq!(anthropic.name(), "anthropic");
        let openai = build_provider("openai", "key", params).unwrap();
        assert_eq!(openai.name(), "openai");
    }

    #[test]
    fn test_build_provider_unknown_name() {
        let params = GenParams::from_defaults(&LlmDefaults::default());
        let err = build_provider("groq", "key", params).err().unwrap();
        assert!(err.to_string().contains("groq"));
    }
}
