//! Status, metrics and history command handlers.

use anyhow::Result;

use raido::cache::RedisCache;
use raido::config::Settings;
use raido::storage::{ActivityStore, CommandStatus, MetricsFilter};
use raido::vault::{Vault, VAULT_FILE};

pub(crate) async fn cmd_status() -> Result<()> {
    let settings = Settings::from_env()?;

    println!("Configuration:");
    println!("  Data dir:    {}", settings.data_dir.display());
    println!("  Agents dir:  {}", settings.agents_dir.display());
    println!("  Database:    {}", settings.database_path.display());
    println!("  Redis:       {}", settings.redis_url);
    println!("  Provider:    {} ({})", settings.default_provider, settings.llm.model);

    let definitions = count_agent_definitions(&settings);
    println!("\nAgents:");
    println!("  Definitions: {}", definitions);

    println!("\nVault:");
    if settings.data_dir.join(VAULT_FILE).exists() {
        match Vault::open(&settings.data_dir) {
            Ok(vault) => println!("  Status: active ({} credentials)", vault.len()),
            Err(e) => println!("  Status: error ({})", e),
        }
    } else {
        println!("  Status: not initialized");
    }

    println!("\nRedis:");
    match RedisCache::connect(&settings.redis_url).await {
        Ok(_) => println!("  Status: reachable"),
        Err(e) => println!("  Status: unavailable ({})", e),
    }

    Ok(())
}

fn count_agent_definitions(settings: &Settings) -> usize {
    std::fs::read_dir(&settings.agents_dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| {
                    matches!(
                        entry.path().extension().and_then(|e| e.to_str()),
                        Some("yaml") | Some("yml")
                    )
                })
                .count()
        })
        .unwrap_or(0)
}

pub(crate) async fn cmd_metrics(agent: Option<String>) -> Result<()> {
    let settings = Settings::from_env()?;
    let store = ActivityStore::open(&settings.database_path)?;
    let filter = MetricsFilter {
        agent_id: agent,
        ..Default::default()
    };
    let rows = store.agent_metrics(&filter).await?;

    if rows.is_empty() {
        println!("No metrics recorded.");
        return Ok(());
    }
    println!("Agent metrics:");
    for row in rows {
        let mark = if row.success { "ok" } else { "FAILED" };
        println!(
            "  {}  {:<12} {:<16} {:>8.1} ms  {:>6} tokens  {}",
            row.timestamp, row.agent_id, row.request_kind, row.processing_ms, row.tokens_used, mark
        );
        if let Some(error) = row.error_message {
            println!("      error: {}", error);
        }
    }
    Ok(())
}

pub(crate) async fn cmd_history(server: Option<String>, limit: usize) -> Result<()> {
    let settings = Settings::from_env()?;
    let store = ActivityStore::open(&settings.database_path)?;
    let rows = store.command_history(server.as_deref(), limit).await?;

    if rows.is_empty() {
        println!("No command history.");
        return Ok(());
    }
    println!("Command history:");
    for row in rows {
        let mark = if row.status == CommandStatus::Success {
            "ok"
        } else {
            "FAILED"
        };
        println!(
            "  {}  {:<12} {}  ({} by {})",
            row.executed_at, row.server_name, row.command, mark, row.executed_by
        );
        if let Some(output) = row.output.filter(|o| !o.is_empty()) {
            println!("      output: {}", truncate(&output, 100));
        }
        if let Some(error) = row.error.filter(|e| !e.is_empty()) {
            println!("      error: {}", truncate(&error, 100));
        }
    }
    Ok(())
}

fn truncate(text: &str, max: usize) -> String {
    let trimmed = text.trim_end();
    if trimmed.chars().count() <= max {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(max).collect();
        format!("{}...", cut)
    }
}
