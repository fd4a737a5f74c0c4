//! Agent contract, declarative agent specs and the factory that builds them.
//!
//! An agent is anything that can answer an inbound message and optionally
//! produce autonomous actions on each environment step. The two built-in
//! implementations are [`LlmAgent`] (chat completion with response caching)
//! and [`OpsAgent`] (adds vault-backed remote command execution).

pub mod llm_agent;
pub mod ops_agent;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bus::Message;
use crate::cache::CacheStore;
use crate::config::Settings;
use crate::error::{RaidoError, Result};
use crate::providers::{build_provider, GenParams};
use crate::storage::ActivityStore;
use crate::vault::Vault;

pub use llm_agent::LlmAgent;
pub use ops_agent::OpsAgent;

/// The agent contract: respond to messages, act autonomously on steps.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable identifier this agent is registered (and addressed) under.
    fn id(&self) -> &str;

    /// Answer an inbound message with a response value.
    async fn process_message(&self, message: &Message) -> Result<Value>;

    /// Produce autonomous actions for one environment step.
    async fn act(&self) -> Result<Vec<AgentAction>>;
}

/// A single autonomous action emitted by [`Agent::act`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    pub name: String,
    #[serde(default)]
    pub payload: Value,
}

impl AgentAction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Which built-in agent implementation a spec maps to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    #[default]
    Llm,
    Ops,
}

/// Declarative agent definition, stored as `<agents_dir>/<id>.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSpec {
    #[serde(default)]
    pub kind: AgentKind,
    /// Provider name; falls back to the runtime default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// Builds agents from specs, wiring in the shared runtime services.
pub struct AgentFactory {
    settings: Settings,
    cache: Option<Arc<dyn CacheStore>>,
    store: Option<ActivityStore>,
    vault: Option<Arc<Vault>>,
}

impl AgentFactory {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            cache: None,
            store: None,
            vault: None,
        }
    }

    /// Share a response cache with every built agent.
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Share an activity store with every built agent.
    pub fn with_store(mut self, store: ActivityStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Vault handle required for [`AgentKind::Ops`] agents.
    pub fn with_vault(mut self, vault: Arc<Vault>) -> Self {
        self.vault = Some(vault);
        self
    }

    /// Build an agent from its spec.
    pub fn build(&self, id: &str, spec: &AgentSpec) -> Result<Arc<dyn Agent>> {
        let provider_name = spec
            .provider
            .clone()
            .unwrap_or_else(|| self.settings.default_provider.clone());
        let api_key = self.settings.api_key_for(&provider_name).ok_or_else(|| {
            RaidoError::Config(format!(
                "No API key configured for provider '{}' (agent '{}')",
                provider_name, id
            ))
        })?;

        let defaults = &self.settings.llm;
        let params = GenParams {
            model: spec.model.clone().unwrap_or_else(|| defaults.model.clone()),
            temperature: spec.temperature.unwrap_or(defaults.temperature),
            max_tokens: spec.max_tokens.unwrap_or(defaults.max_tokens),
            system_prompt: spec.system_prompt.clone(),
        };
        let provider = build_provider(&provider_name, api_key, params)?;
        let cache_ttl = std::time::Duration::from_secs(self.settings.cache_ttl_secs);

        match spec.kind {
            AgentKind::Llm => {
                let mut agent = LlmAgent::new(id, provider);
                if let Some(cache) = &self.cache {
                    agent = agent.with_cache(cache.clone(), cache_ttl);
                }
                if let Some(store) = &self.store {
                    agent = agent.with_store(store.clone());
                }
                Ok(Arc::new(agent))
            }
            AgentKind::Ops => {
                let vault = self.vault.clone().ok_or_else(|| {
                    RaidoError::Config(format!(
                        "Agent '{}' needs a vault but none is configured",
                        id
                    ))
                })?;
                let mut agent = OpsAgent::new(id, provider, vault);
                if let Some(cache) = &self.cache {
                    agent = agent.with_cache(cache.clone(), cache_ttl);
                }
                if let Some(store) = &self.store {
                    agent = agent.with_store(store.clone());
                }
                Ok(Arc::new(agent))
            }
        }
    }
}
