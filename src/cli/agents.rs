//! Agent definition and chat command handlers.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::json;
use tracing::warn;

use raido::agent::{AgentFactory, AgentKind, AgentSpec};
use raido::bus::Message;
use raido::cache::RedisCache;
use raido::config::Settings;
use raido::environment::Environment;
use raido::storage::ActivityStore;
use raido::vault::Vault;

use super::AgentsAction;

pub(crate) async fn cmd_agents(action: AgentsAction) -> Result<()> {
    match action {
        AgentsAction::List => cmd_agents_list(),
        AgentsAction::Create {
            name,
            kind,
            provider,
            system_prompt,
        } => cmd_agents_create(&name, &kind, provider, system_prompt),
    }
}

fn cmd_agents_list() -> Result<()> {
    let settings = Settings::from_env()?;
    if !settings.agents_dir.exists() {
        println!("No agent definitions ({} does not exist).", settings.agents_dir.display());
        return Ok(());
    }

    let mut names: Vec<String> = std::fs::read_dir(&settings.agents_dir)
        .with_context(|| format!("Cannot read {}", settings.agents_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            )
        })
        .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .collect();
    names.sort();

    if names.is_empty() {
        println!("No agent definitions in {}.", settings.agents_dir.display());
        return Ok(());
    }
    println!("Agent definitions:");
    for name in names {
        println!("  - {}", name);
    }
    Ok(())
}

fn cmd_agents_create(
    name: &str,
    kind: &str,
    provider: Option<String>,
    system_prompt: Option<String>,
) -> Result<()> {
    let kind = match kind {
        "llm" => AgentKind::Llm,
        "ops" => AgentKind::Ops,
        other => bail!("Unknown agent kind '{}' (expected llm or ops)", other),
    };

    let settings = Settings::from_env()?;
    let spec = AgentSpec {
        kind,
        provider,
        system_prompt,
        ..Default::default()
    };

    let env = Environment::new(settings.agents_dir.clone(), settings.data_dir.clone());
    let path = env.save_agent_spec(name, &spec)?;
    println!("Created agent definition {}", path.display());
    Ok(())
}

pub(crate) async fn cmd_chat(agent_id: &str, message: &str) -> Result<()> {
    let settings = Settings::from_env()?;
    settings.ensure_dirs()?;

    let store = ActivityStore::open(&settings.database_path)?;
    let vault = Arc::new(Vault::open(&settings.data_dir)?);
    let mut factory = AgentFactory::new(settings.clone())
        .with_store(store)
        .with_vault(vault);

    match RedisCache::connect(&settings.redis_url).await {
        Ok(cache) => factory = factory.with_cache(Arc::new(cache)),
        Err(e) => warn!("Response cache disabled: {}", e),
    }

    let env = Environment::new(settings.agents_dir.clone(), settings.data_dir.clone());
    let loaded = env.load_agents(&factory).await?;
    if env.get_agent(agent_id).await.is_none() {
        bail!(
            "Agent '{}' not found ({} definitions loaded from {})",
            agent_id,
            loaded,
            settings.agents_dir.display()
        );
    }

    let envelope = Message::new("cli", agent_id, json!({ "content": message }));
    let response = env.send(envelope).await?;
    match response {
        Some(value) => {
            if let Some(text) = value["response"].as_str() {
                println!("{}", text);
            } else {
                println!("{}", value);
            }
            Ok(())
        }
        None => bail!("Agent '{}' did not accept the message", agent_id),
    }
}
