//! Command-line interface: argument surface and dispatch.

mod agents;
mod data;
mod status;
mod vault;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "raido", version, about = "Lightweight multi-agent runtime")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage agent definitions.
    Agents {
        #[command(subcommand)]
        action: AgentsAction,
    },
    /// Send one message to an agent and print its response.
    Chat {
        /// Agent id (the definition file stem).
        agent: String,
        /// Message text.
        message: String,
    },
    /// Show runtime status.
    Status,
    /// Show agent usage metrics.
    Metrics {
        /// Only show metrics for this agent.
        #[arg(long)]
        agent: Option<String>,
    },
    /// Show remote command history.
    History {
        /// Only show commands for this server.
        #[arg(long)]
        server: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Manage the credential vault.
    Vault {
        #[command(subcommand)]
        action: VaultAction,
    },
    /// Delete cached values matching a pattern.
    CacheClear {
        #[arg(long, default_value = "llm:response:*")]
        pattern: String,
    },
    /// Show task queue depths.
    Queues,
    /// Run housekeeping: log cleanup, retention pruning, vault backup.
    Maintenance {
        #[arg(long, default_value_t = 30)]
        log_days: u32,
        #[arg(long, default_value_t = 90)]
        metric_days: u32,
        #[arg(long, default_value_t = 90)]
        command_days: u32,
    },
}

#[derive(Subcommand)]
pub enum AgentsAction {
    /// List agent definitions.
    List,
    /// Write a new agent definition file.
    Create {
        name: String,
        /// Agent kind: llm or ops.
        #[arg(long, default_value = "llm")]
        kind: String,
        /// Provider name (defaults to the runtime default).
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        system_prompt: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum VaultAction {
    /// List credential keys.
    List,
    /// Store a credential. The value is parsed as JSON, or kept as a string.
    Set { key: String, value: String },
    /// Print a credential value.
    Get { key: String },
    /// Delete a credential.
    Delete { key: String },
    /// Create a timestamped backup.
    Backup,
    /// Restore from a backup stem (path without extension).
    Restore { stem: PathBuf },
    /// List available backups, newest first.
    Backups,
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Agents { action } => agents::cmd_agents(action).await,
        Command::Chat { agent, message } => agents::cmd_chat(&agent, &message).await,
        Command::Status => status::cmd_status().await,
        Command::Metrics { agent } => status::cmd_metrics(agent).await,
        Command::History { server, limit } => status::cmd_history(server, limit).await,
        Command::Vault { action } => vault::cmd_vault(action).await,
        Command::CacheClear { pattern } => data::cmd_cache_clear(&pattern).await,
        Command::Queues => data::cmd_queues().await,
        Command::Maintenance {
            log_days,
            metric_days,
            command_days,
        } => data::cmd_maintenance(log_days, metric_days, command_days).await,
    }
}
