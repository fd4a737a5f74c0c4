//! Chat-completion agent with response caching and usage metrics.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::bus::Message;
use crate::cache::{response_key, CacheStore};
use crate::error::Result;
use crate::providers::{ChatProvider, Usage};
use crate::storage::{ActivityStore, MetricRecord};

use super::{Agent, AgentAction};

/// Agent backed by an LLM provider.
///
/// The cache and the activity store are both optional and best-effort: a
/// failing cache or metrics write is logged, never surfaced to the caller.
pub struct LlmAgent {
    id: String,
    provider: Arc<dyn ChatProvider>,
    cache: Option<Arc<dyn CacheStore>>,
    cache_ttl: Duration,
    store: Option<ActivityStore>,
}

/// Outcome of one generation, used for metrics.
pub(super) struct GenerationOutcome {
    pub text: String,
    pub usage: Option<Usage>,
    pub cached: bool,
}

impl LlmAgent {
    pub fn new(id: impl Into<String>, provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            id: id.into(),
            provider,
            cache: None,
            cache_ttl: Duration::from_secs(3600),
            store: None,
        }
    }

    /// Enable response caching with the given TTL.
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl;
        self
    }

    /// Enable usage metric logging.
    pub fn with_store(mut self, store: ActivityStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Generate a completion, going through the response cache when enabled.
    pub(super) async fn generate(&self, prompt: &str) -> Result<GenerationOutcome> {
        let key = response_key(self.provider.name(), self.provider.model(), prompt);

        if let Some(cache) = &self.cache {
            match cache.get(&key).await {
                Ok(Some(value)) => {
                    if let Some(text) = value.as_str() {
                        debug!(agent = %self.id, "LLM response cache hit");
                        return Ok(GenerationOutcome {
                            text: text.to_string(),
                            usage: None,
                            cached: true,
                        });
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(agent = %self.id, "Response cache read failed: {}", e),
            }
        }

        let generation = self.provider.generate(prompt).await?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache
                .set(&key, &json!(generation.text), Some(self.cache_ttl))
                .await
            {
                warn!(agent = %self.id, "Response cache write failed: {}", e);
            }
        }

        Ok(GenerationOutcome {
            text: generation.text,
            usage: generation.usage,
            cached: false,
        })
    }

    /// Write a metric row; failures are logged, never propagated.
    pub(super) async fn log_metric(&self, record: MetricRecord) {
        if let Some(store) = &self.store {
            if let Err(e) = store.log_metric(&record).await {
                warn!(agent = %self.id, "Failed to log agent metric: {}", e);
            }
        }
    }

    pub(super) fn store(&self) -> Option<&ActivityStore> {
        self.store.as_ref()
    }
}

#[async_trait]
impl Agent for LlmAgent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn process_message(&self, message: &Message) -> Result<Value> {
        let started = Instant::now();
        let prompt = message.text();
        let result = self.generate(&prompt).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(outcome) => {
                self.log_metric(MetricRecord {
                    agent_id: self.id.clone(),
                    request_kind: "message".to_string(),
                    processing_ms: elapsed_ms,
                    tokens_used: outcome
                        .usage
                        .map(|u| i64::from(u.total_tokens))
                        .unwrap_or(0),
                    success: true,
                    error_message: None,
                    extra: Some(json!({
                        "cached": outcome.cached,
                        "model": self.provider.model(),
                    })),
                })
                .await;
                Ok(json!({ "response": outcome.text }))
            }
            Err(err) => {
                self.log_metric(MetricRecord {
                    agent_id: self.id.clone(),
                    request_kind: "message".to_string(),
                    processing_ms: elapsed_ms,
                    tokens_used: 0,
                    success: false,
                    error_message: Some(err.to_string()),
                    extra: None,
                })
                .await;
                Err(err)
            }
        }
    }

    /// LLM agents take no autonomous actions.
    async fn act(&self) -> Result<Vec<AgentAction>> {
        Ok(Vec::new())
    }
}
