//! raido — a lightweight multi-agent runtime.
//!
//! The runtime is built from a handful of small pieces:
//!
//! - [`agent`]: the [`Agent`](agent::Agent) contract plus the built-in
//!   LLM-backed and ops implementations.
//! - [`environment`]: an insertion-ordered agent registry with a step loop.
//! - [`bus`]: the message envelope and a single-subscriber broker.
//! - [`providers`]: Anthropic/OpenAI chat clients behind one trait.
//! - [`cache`]: interchangeable memory and redis key-value backends.
//! - [`vault`]: credentials encrypted at rest, with file backups.
//! - [`storage`]: SQLite command history, metrics and credential registry.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use raido::{Environment, Message};
//! use raido::agent::{AgentFactory, AgentSpec};
//! use raido::config::Settings;
//!
//! # async fn run() -> raido::Result<()> {
//! let settings = Settings::from_env()?;
//! let factory = AgentFactory::new(settings.clone());
//! let env = Environment::new(settings.agents_dir.clone(), settings.data_dir.clone());
//! env.load_agents(&factory).await?;
//!
//! let reply = env
//!     .send(Message::new("cli", "helper", serde_json::json!({"content": "hello"})))
//!     .await?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod bus;
pub mod cache;
pub mod config;
pub mod environment;
pub mod error;
pub mod maintenance;
pub mod providers;
pub mod storage;
pub mod vault;

pub use agent::{Agent, AgentAction, AgentFactory, AgentSpec, LlmAgent, OpsAgent};
pub use bus::{Message, MessageBroker, MessageHandler, MessageKind};
pub use environment::Environment;
pub use error::{RaidoError, Result};
pub use providers::ChatProvider;
pub use vault::Vault;
