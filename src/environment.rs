//! Agent registry and step-based execution loop.
//!
//! The environment owns the broker: registering an agent subscribes it under
//! its id, so any message published to that id reaches the agent's
//! `process_message`. `step()` walks every agent in insertion order and
//! gathers the actions they produce.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::agent::{Agent, AgentAction, AgentFactory, AgentSpec};
use crate::bus::{Message, MessageBroker, MessageHandler};
use crate::error::Result;

/// Forwards broker deliveries to an agent's `process_message`.
struct AgentSubscriber(Arc<dyn Agent>);

#[async_trait]
impl MessageHandler for AgentSubscriber {
    async fn handle(&self, message: Message) -> Result<Value> {
        self.0.process_message(&message).await
    }
}

#[derive(Default)]
struct Registry {
    /// Agent ids in registration order; `step()` and listings follow it.
    order: Vec<String>,
    agents: HashMap<String, Arc<dyn Agent>>,
}

/// Snapshot of the environment for status output.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentState {
    pub agents: Vec<String>,
    pub agents_dir: PathBuf,
    pub data_dir: PathBuf,
}

/// Registry of agents wired to a message broker.
pub struct Environment {
    registry: RwLock<Registry>,
    broker: Arc<MessageBroker>,
    agents_dir: PathBuf,
    data_dir: PathBuf,
}

impl Environment {
    pub fn new(agents_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            broker: Arc::new(MessageBroker::new()),
            agents_dir,
            data_dir,
        }
    }

    /// The broker agents are subscribed on.
    pub fn broker(&self) -> &Arc<MessageBroker> {
        &self.broker
    }

    /// Register an agent and subscribe it on the broker.
    ///
    /// Re-registering an id replaces the agent but keeps its position in the
    /// step order.
    pub async fn add_agent(&self, agent: Arc<dyn Agent>) {
        let id = agent.id().to_string();
        {
            let mut registry = self.registry.write().await;
            if registry.agents.insert(id.clone(), agent.clone()).is_none() {
                registry.order.push(id.clone());
            }
        }
        self.broker
            .subscribe(id.clone(), Arc::new(AgentSubscriber(agent)))
            .await;
        info!(agent = %id, "Agent registered");
    }

    /// Remove an agent and its broker subscription. Returns `true` if present.
    pub async fn remove_agent(&self, id: &str) -> bool {
        let removed = {
            let mut registry = self.registry.write().await;
            if registry.agents.remove(id).is_some() {
                registry.order.retain(|existing| existing != id);
                true
            } else {
                false
            }
        };
        if removed {
            self.broker.unsubscribe(id).await;
            info!(agent = %id, "Agent removed");
        }
        removed
    }

    pub async fn get_agent(&self, id: &str) -> Option<Arc<dyn Agent>> {
        self.registry.read().await.agents.get(id).cloned()
    }

    /// Agent ids in registration order.
    pub async fn list_agents(&self) -> Vec<String> {
        self.registry.read().await.order.clone()
    }

    pub async fn len(&self) -> usize {
        self.registry.read().await.agents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.registry.read().await.agents.is_empty()
    }

    /// Publish a message through the broker.
    pub async fn send(&self, message: Message) -> Result<Option<Value>> {
        self.broker.publish(message).await
    }

    /// Run one pass: every agent's `act()` in registration order.
    ///
    /// A failing agent is logged and skipped; the pass always completes and
    /// returns the actions of the agents that succeeded.
    pub async fn step(&self) -> Vec<AgentAction> {
        let agents: Vec<Arc<dyn Agent>> = {
            let registry = self.registry.read().await;
            registry
                .order
                .iter()
                .filter_map(|id| registry.agents.get(id).cloned())
                .collect()
        };

        let mut actions = Vec::new();
        for agent in agents {
            match agent.act().await {
                Ok(agent_actions) => actions.extend(agent_actions),
                Err(e) => error!(agent = %agent.id(), "Agent act() failed: {}", e),
            }
        }
        actions
    }

    /// Snapshot of the environment.
    pub async fn state(&self) -> EnvironmentState {
        EnvironmentState {
            agents: self.list_agents().await,
            agents_dir: self.agents_dir.clone(),
            data_dir: self.data_dir.clone(),
        }
    }

    /// Load every agent definition from the agents directory.
    ///
    /// Each `<id>.yaml` file is parsed as an [`AgentSpec`] and built through
    /// the factory. Files that fail to parse or build are logged and skipped;
    /// the count of successfully registered agents is returned.
    pub async fn load_agents(&self, factory: &AgentFactory) -> Result<usize> {
        if !self.agents_dir.exists() {
            return Ok(0);
        }

        let mut entries: Vec<PathBuf> = std::fs::read_dir(&self.agents_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .collect();
        entries.sort();

        let mut loaded = 0;
        for path in entries {
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match load_spec(&path) {
                Ok(spec) => match factory.build(id, &spec) {
                    Ok(agent) => {
                        self.add_agent(agent).await;
                        loaded += 1;
                    }
                    Err(e) => warn!(path = %path.display(), "Skipping agent definition: {}", e),
                },
                Err(e) => warn!(path = %path.display(), "Skipping agent definition: {}", e),
            }
        }
        Ok(loaded)
    }

    /// Write an agent spec to `<agents_dir>/<id>.yaml`.
    pub fn save_agent_spec(&self, id: &str, spec: &AgentSpec) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.agents_dir)?;
        let path = self.agents_dir.join(format!("{}.yaml", id));
        let yaml = serde_yaml::to_string(spec)
            .map_err(|e| crate::error::RaidoError::Config(format!("Invalid agent spec: {}", e)))?;
        std::fs::write(&path, yaml)?;
        Ok(path)
    }
}

fn load_spec(path: &Path) -> Result<AgentSpec> {
    let raw = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&raw).map_err(|e| {
        crate::error::RaidoError::Config(format!("Invalid agent spec {}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::error::RaidoError;
    use serde_json::json;
    use tempfile::TempDir;

    struct MockAgent {
        id: String,
        actions: Vec<AgentAction>,
    }

    impl MockAgent {
        fn new(id: &str, action: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                actions: vec![AgentAction::new(action)],
            })
        }
    }

    #[async_trait]
    impl Agent for MockAgent {
        fn id(&self) -> &str {
            &self.id
        }
        async fn process_message(&self, message: &Message) -> Result<Value> {
            Ok(json!({ "echo": message.content }))
        }
        async fn act(&self) -> Result<Vec<AgentAction>> {
            Ok(self.actions.clone())
        }
    }

    struct BrokenAgent;

    #[async_trait]
    impl Agent for BrokenAgent {
        fn id(&self) -> &str {
            "broken"
        }
        async fn process_message(&self, _message: &Message) -> Result<Value> {
            Err(RaidoError::Agent("nope".into()))
        }
        async fn act(&self) -> Result<Vec<AgentAction>> {
            Err(RaidoError::Agent("act failed".into()))
        }
    }

    fn test_env(tmp: &TempDir) -> Environment {
        Environment::new(tmp.path().join("agents"), tmp.path().join("data"))
    }

    #[tokio::test]
    async fn test_add_get_list_remove() {
        let tmp = TempDir::new().unwrap();
        let env = test_env(&tmp);

        env.add_agent(MockAgent::new("b", "x")).await;
        env.add_agent(MockAgent::new("a", "y")).await;

        assert_eq!(env.len().await, 2);
        assert!(env.get_agent("a").await.is_some());
        assert!(env.get_agent("missing").await.is_none());
        // Registration order, not alphabetical.
        assert_eq!(env.list_agents().await, vec!["b", "a"]);

        assert!(env.remove_agent("b").await);
        assert!(!env.remove_agent("b").await);
        assert_eq!(env.list_agents().await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_registered_agent_receives_messages() {
        let tmp = TempDir::new().unwrap();
        let env = test_env(&tmp);
        env.add_agent(MockAgent::new("receiver", "x")).await;

        let message = Message::new("sender", "receiver", json!({"text": "hello"}));
        let response = env.send(message).await.unwrap();
        assert_eq!(response.unwrap()["echo"]["text"], "hello");
    }

    #[tokio::test]
    async fn test_removed_agent_stops_receiving() {
        let tmp = TempDir::new().unwrap();
        let env = test_env(&tmp);
        env.add_agent(MockAgent::new("receiver", "x")).await;
        env.remove_agent("receiver").await;

        let message = Message::new("sender", "receiver", json!("hi"));
        assert!(env.send(message).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_step_concatenates_in_order() {
        let tmp = TempDir::new().unwrap();
        let env = test_env(&tmp);
        env.add_agent(MockAgent::new("first", "alpha")).await;
        env.add_agent(MockAgent::new("second", "beta")).await;

        let actions = env.step().await;
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].name, "alpha");
        assert_eq!(actions[1].name, "beta");
    }

    #[tokio::test]
    async fn test_step_isolates_failing_agent() {
        let tmp = TempDir::new().unwrap();
        let env = test_env(&tmp);
        env.add_agent(MockAgent::new("first", "alpha")).await;
        env.add_agent(Arc::new(BrokenAgent)).await;
        env.add_agent(MockAgent::new("third", "gamma")).await;

        let actions = env.step().await;
        // The broken agent contributes nothing but does not abort the pass.
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].name, "alpha");
        assert_eq!(actions[1].name, "gamma");
    }

    #[tokio::test]
    async fn test_replacing_agent_keeps_order() {
        let tmp = TempDir::new().unwrap();
        let env = test_env(&tmp);
        env.add_agent(MockAgent::new("a", "old")).await;
        env.add_agent(MockAgent::new("b", "other")).await;
        env.add_agent(MockAgent::new("a", "new")).await;

        assert_eq!(env.list_agents().await, vec!["a", "b"]);
        let actions = env.step().await;
        assert_eq!(actions[0].name, "new");
    }

    #[tokio::test]
    async fn test_state_snapshot() {
        let tmp = TempDir::new().unwrap();
        let env = test_env(&tmp);
        env.add_agent(MockAgent::new("a", "x")).await;

        let state = env.state().await;
        assert_eq!(state.agents, vec!["a"]);
        assert_eq!(state.agents_dir, tmp.path().join("agents"));
    }

    #[tokio::test]
    async fn test_save_and_load_agent_specs() {
        let tmp = TempDir::new().unwrap();
        let env = test_env(&tmp);

        let spec = AgentSpec {
            system_prompt: Some("You are helpful.".into()),
            ..Default::default()
        };
        env.save_agent_spec("helper", &spec).unwrap();
        // A malformed definition must not sink the whole load.
        std::fs::write(tmp.path().join("agents/bad.yaml"), ":[ not yaml").unwrap();

        let settings = Settings {
            anthropic_api_key: Some("test-key".into()),
            ..Settings::default()
        };
        let factory = AgentFactory::new(settings);
        let loaded = env.load_agents(&factory).await.unwrap();

        assert_eq!(loaded, 1);
        assert_eq!(env.list_agents().await, vec!["helper"]);
    }

    #[tokio::test]
    async fn test_load_agents_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let env = test_env(&tmp);
        let factory = AgentFactory::new(Settings::default());
        assert_eq!(env.load_agents(&factory).await.unwrap(), 0);
    }
}
