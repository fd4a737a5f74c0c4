//! SQLite-backed activity store.
//!
//! Three tables record what the runtime did: commands executed on remote
//! servers, per-agent usage metrics, and a registry of vault credential keys
//! with access counters (the credential *values* never touch the database).

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS command_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    server_name TEXT NOT NULL,
    command TEXT NOT NULL,
    executed_at TEXT NOT NULL,
    executed_by TEXT NOT NULL,
    status TEXT NOT NULL,
    output TEXT,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_commands_server ON command_history(server_name, executed_at DESC);
CREATE INDEX IF NOT EXISTS idx_commands_executed_at ON command_history(executed_at DESC);

CREATE TABLE IF NOT EXISTS agent_metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    request_kind TEXT NOT NULL,
    processing_ms REAL NOT NULL,
    tokens_used INTEGER NOT NULL DEFAULT 0,
    success INTEGER NOT NULL DEFAULT 1,
    error_message TEXT,
    extra TEXT
);

CREATE INDEX IF NOT EXISTS idx_metrics_agent ON agent_metrics(agent_id, timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_metrics_timestamp ON agent_metrics(timestamp DESC);

CREATE TABLE IF NOT EXISTS stored_credentials (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    credential_key TEXT UNIQUE NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL,
    last_updated TEXT NOT NULL,
    last_accessed TEXT,
    access_count INTEGER NOT NULL DEFAULT 0,
    extra TEXT
);
"#;

/// Outcome of a remote command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    Error,
}

impl CommandStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandStatus::Success => "success",
            CommandStatus::Error => "error",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "success" => CommandStatus::Success,
            _ => CommandStatus::Error,
        }
    }
}

/// A command execution to record.
#[derive(Debug, Clone)]
pub struct CommandRecord {
    pub server_name: String,
    pub command: String,
    pub executed_by: String,
    pub status: CommandStatus,
    pub output: Option<String>,
    pub error: Option<String>,
}

/// A stored command row.
#[derive(Debug, Clone)]
pub struct CommandEntry {
    pub id: i64,
    pub server_name: String,
    pub command: String,
    pub executed_at: String,
    pub executed_by: String,
    pub status: CommandStatus,
    pub output: Option<String>,
    pub error: Option<String>,
}

/// A usage metric to record.
#[derive(Debug, Clone)]
pub struct MetricRecord {
    pub agent_id: String,
    pub request_kind: String,
    pub processing_ms: f64,
    pub tokens_used: i64,
    pub success: bool,
    pub error_message: Option<String>,
    pub extra: Option<Value>,
}

/// A stored metric row.
#[derive(Debug, Clone)]
pub struct MetricEntry {
    pub id: i64,
    pub agent_id: String,
    pub timestamp: String,
    pub request_kind: String,
    pub processing_ms: f64,
    pub tokens_used: i64,
    pub success: bool,
    pub error_message: Option<String>,
    pub extra: Option<Value>,
}

/// A stored credential-registry row.
#[derive(Debug, Clone)]
pub struct CredentialEntry {
    pub id: i64,
    pub credential_key: String,
    pub description: Option<String>,
    pub created_at: String,
    pub last_updated: String,
    pub last_accessed: Option<String>,
    pub access_count: i64,
    pub extra: Option<Value>,
}

/// Filter for [`ActivityStore::agent_metrics`].
#[derive(Debug, Clone, Default)]
pub struct MetricsFilter {
    pub agent_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// SQLite store for command history, agent metrics and the credential registry.
#[derive(Clone)]
pub struct ActivityStore {
    conn: Arc<Mutex<Connection>>,
}

impl ActivityStore {
    /// Open (or create) the database at `path` and bootstrap the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        debug!(path = %path.display(), "Opened activity store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ── Command history ──────────────────────────────────────────────────────

    /// Record an executed command. Returns the row id.
    pub async fn log_command(&self, record: &CommandRecord) -> Result<i64> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO command_history
             (server_name, command, executed_at, executed_by, status, output, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.server_name,
                record.command,
                now_string(),
                record.executed_by,
                record.status.as_str(),
                record.output,
                record.error,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Command history, newest first, optionally filtered by server name.
    pub async fn command_history(
        &self,
        server_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CommandEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, server_name, command, executed_at, executed_by, status, output, error
             FROM command_history
             WHERE (?1 IS NULL OR server_name = ?1)
             ORDER BY executed_at DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![server_name, limit as i64], |row| {
            let status: String = row.get(5)?;
            Ok(CommandEntry {
                id: row.get(0)?,
                server_name: row.get(1)?,
                command: row.get(2)?,
                executed_at: row.get(3)?,
                executed_by: row.get(4)?,
                status: CommandStatus::parse(&status),
                output: row.get(6)?,
                error: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Delete command rows older than `days`. Returns how many were removed.
    pub async fn prune_commands(&self, days: u32) -> Result<usize> {
        let cutoff = cutoff_string(days);
        let conn = self.conn.lock().await;
        let removed = conn.execute(
            "DELETE FROM command_history WHERE executed_at < ?1",
            params![cutoff],
        )?;
        Ok(removed)
    }

    // ── Agent metrics ────────────────────────────────────────────────────────

    /// Record a usage metric. Returns the row id.
    pub async fn log_metric(&self, record: &MetricRecord) -> Result<i64> {
        let extra = match &record.extra {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO agent_metrics
             (agent_id, timestamp, request_kind, processing_ms, tokens_used, success, error_message, extra)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.agent_id,
                now_string(),
                record.request_kind,
                record.processing_ms,
                record.tokens_used,
                record.success as i64,
                record.error_message,
                extra,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Metrics matching the filter, newest first.
    pub async fn agent_metrics(&self, filter: &MetricsFilter) -> Result<Vec<MetricEntry>> {
        let from = filter.from.map(format_timestamp);
        let to = filter.to.map(format_timestamp);
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, agent_id, timestamp, request_kind, processing_ms, tokens_used,
                    success, error_message, extra
             FROM agent_metrics
             WHERE (?1 IS NULL OR agent_id = ?1)
               AND (?2 IS NULL OR timestamp >= ?2)
               AND (?3 IS NULL OR timestamp <= ?3)
             ORDER BY timestamp DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![filter.agent_id, from, to], |row| {
            let success: i64 = row.get(6)?;
            let extra: Option<String> = row.get(8)?;
            Ok(MetricEntry {
                id: row.get(0)?,
                agent_id: row.get(1)?,
                timestamp: row.get(2)?,
                request_kind: row.get(3)?,
                processing_ms: row.get(4)?,
                tokens_used: row.get(5)?,
                success: success != 0,
                error_message: row.get(7)?,
                extra: extra.and_then(|raw| serde_json::from_str(&raw).ok()),
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Delete metric rows older than `days`. Returns how many were removed.
    pub async fn prune_metrics(&self, days: u32) -> Result<usize> {
        let cutoff = cutoff_string(days);
        let conn = self.conn.lock().await;
        let removed = conn.execute(
            "DELETE FROM agent_metrics WHERE timestamp < ?1",
            params![cutoff],
        )?;
        Ok(removed)
    }

    // ── Credential registry ──────────────────────────────────────────────────

    /// Register a credential key (metadata only). Re-registering refreshes the
    /// description, extra data and `last_updated` stamp.
    pub async fn register_credential(
        &self,
        key: &str,
        description: Option<&str>,
        extra: Option<&Value>,
    ) -> Result<()> {
        let extra = match extra {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };
        let now = now_string();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO stored_credentials (credential_key, description, created_at, last_updated, extra)
             VALUES (?1, ?2, ?3, ?3, ?4)
             ON CONFLICT(credential_key) DO UPDATE SET
                 description = excluded.description,
                 extra = excluded.extra,
                 last_updated = excluded.last_updated",
            params![key, description, now, extra],
        )?;
        Ok(())
    }

    /// Record an access to a credential. Returns `false` for unknown keys.
    pub async fn touch_credential(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let updated = conn.execute(
            "UPDATE stored_credentials
             SET last_accessed = ?1, access_count = access_count + 1
             WHERE credential_key = ?2",
            params![now_string(), key],
        )?;
        Ok(updated > 0)
    }

    /// Look up a credential-registry row.
    pub async fn credential(&self, key: &str) -> Result<Option<CredentialEntry>> {
        let conn = self.conn.lock().await;
        let entry = conn
            .query_row(
                "SELECT id, credential_key, description, created_at, last_updated,
                        last_accessed, access_count, extra
                 FROM stored_credentials WHERE credential_key = ?1",
                params![key],
                |row| {
                    let extra: Option<String> = row.get(7)?;
                    Ok(CredentialEntry {
                        id: row.get(0)?,
                        credential_key: row.get(1)?,
                        description: row.get(2)?,
                        created_at: row.get(3)?,
                        last_updated: row.get(4)?,
                        last_accessed: row.get(5)?,
                        access_count: row.get(6)?,
                        extra: extra.and_then(|raw| serde_json::from_str(&raw).ok()),
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn now_string() -> String {
    format_timestamp(Utc::now())
}

fn cutoff_string(days: u32) -> String {
    format_timestamp(Utc::now() - Duration::days(i64::from(days)))
}
