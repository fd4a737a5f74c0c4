//! Ops agent: the LLM flow plus vault-backed remote command execution.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::bus::Message;
use crate::cache::CacheStore;
use crate::error::{RaidoError, Result};
use crate::providers::ChatProvider;
use crate::storage::{ActivityStore, CommandRecord, CommandStatus, MetricRecord};
use crate::vault::Vault;

use super::{Agent, AgentAction, LlmAgent};

/// Vault key holding the map of server connection credentials.
pub const SERVER_CREDENTIALS_KEY: &str = "server_credentials";

/// Connection details for one remote server, as stored in the vault.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerCredential {
    pub host: String,
    pub username: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Private key path; a leading `~` expands to the home directory.
    #[serde(default)]
    pub ssh_key: Option<String>,
}

fn default_port() -> u16 {
    22
}

/// Captured result of a remote command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

/// Agent with read access to the credential vault and an ssh execution path.
///
/// Every remote command is recorded in the command history, and every
/// credential read bumps the access counter in the credential registry.
pub struct OpsAgent {
    inner: LlmAgent,
    vault: Arc<Vault>,
}

impl OpsAgent {
    pub fn new(id: impl Into<String>, provider: Arc<dyn ChatProvider>, vault: Arc<Vault>) -> Self {
        Self {
            inner: LlmAgent::new(id, provider),
            vault,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        self.inner = self.inner.with_cache(cache, ttl);
        self
    }

    pub fn with_store(mut self, store: ActivityStore) -> Self {
        self.inner = self.inner.with_store(store);
        self
    }

    /// Server credentials from the vault.
    ///
    /// A vault without the entry yields an empty map; a present-but-malformed
    /// entry is an error. Reads are recorded in the credential registry.
    pub async fn server_credentials(&self) -> Result<HashMap<String, ServerCredential>> {
        if !self.vault.contains(SERVER_CREDENTIALS_KEY) {
            return Ok(HashMap::new());
        }
        let value = self.vault.get(SERVER_CREDENTIALS_KEY)?;
        let credentials: HashMap<String, ServerCredential> = serde_json::from_value(value)?;

        if let Some(store) = self.inner.store() {
            if let Err(e) = store.touch_credential(SERVER_CREDENTIALS_KEY).await {
                warn!(agent = %self.inner.id(), "Failed to record credential access: {}", e);
            }
        }
        Ok(credentials)
    }

    /// Run a command on a named server over ssh.
    ///
    /// The outcome lands in the command history either way; an unknown server
    /// name is itself recorded as a failed command.
    pub async fn execute_remote(&self, server: &str, command: &str) -> Result<CommandOutput> {
        let started = Instant::now();
        let credentials = self.server_credentials().await?;

        let Some(credential) = credentials.get(server) else {
            let error = format!("No credentials found for server {}", server);
            self.record_command(server, command, CommandStatus::Error, None, Some(&error))
                .await;
            self.record_remote_metric(started, server, command, false, Some(error.clone()))
                .await;
            return Err(RaidoError::Agent(error));
        };

        let args = build_ssh_args(credential, command);
        let output = tokio::process::Command::new("ssh")
            .args(&args)
            .output()
            .await?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
        };

        let status = if result.success {
            CommandStatus::Success
        } else {
            CommandStatus::Error
        };
        self.record_command(
            server,
            command,
            status,
            Some(&result.stdout),
            (!result.stderr.is_empty()).then_some(result.stderr.as_str()),
        )
        .await;
        self.record_remote_metric(started, server, command, result.success, None)
            .await;

        Ok(result)
    }

    async fn record_command(
        &self,
        server: &str,
        command: &str,
        status: CommandStatus,
        output: Option<&str>,
        error: Option<&str>,
    ) {
        if let Some(store) = self.inner.store() {
            let record = CommandRecord {
                server_name: server.to_string(),
                command: command.to_string(),
                executed_by: self.inner.id().to_string(),
                status,
                output: output.map(String::from),
                error: error.map(String::from),
            };
            if let Err(e) = store.log_command(&record).await {
                warn!(agent = %self.inner.id(), "Failed to log command: {}", e);
            }
        }
    }

    async fn record_remote_metric(
        &self,
        started: Instant,
        server: &str,
        command: &str,
        success: bool,
        error_message: Option<String>,
    ) {
        self.inner
            .log_metric(MetricRecord {
                agent_id: self.inner.id().to_string(),
                request_kind: "remote_command".to_string(),
                processing_ms: started.elapsed().as_secs_f64() * 1000.0,
                tokens_used: 0,
                success,
                error_message,
                extra: Some(json!({ "server": server, "command": command })),
            })
            .await;
    }
}

/// Assemble the ssh argument list for a credential + command pair.
fn build_ssh_args(credential: &ServerCredential, command: &str) -> Vec<String> {
    let mut args = vec![
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-p".to_string(),
        credential.port.to_string(),
    ];
    if let Some(key) = &credential.ssh_key {
        args.push("-i".to_string());
        args.push(expand_tilde(key).to_string_lossy().into_owned());
    }
    args.push(format!("{}@{}", credential.username, credential.host));
    args.push(command.to_string());
    args
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

#[async_trait]
impl Agent for OpsAgent {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn process_message(&self, message: &Message) -> Result<Value> {
        self.inner.process_message(message).await
    }

    /// Ops agents take no autonomous actions.
    async fn act(&self) -> Result<Vec<AgentAction>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Generation;
    use crate::storage::MetricsFilter;
    use crate::vault::VAULT_FILE;
    use tempfile::TempDir;

    struct MockProvider;

    #[async_trait]
    impl ChatProvider for MockProvider {
        async fn generate(&self, _prompt: &str) -> Result<Generation> {
            Ok(Generation::text("ok"))
        }
        fn name(&self) -> &str {
            "mock"
        }
        fn model(&self) -> &str {
            "mock-model"
        }
    }

    fn vault_with_credentials(dir: &TempDir) -> Arc<Vault> {
        let mut vault = Vault::with_key(dir.path().join(VAULT_FILE), &[0x42u8; 32]).unwrap();
        vault
            .store(
                SERVER_CREDENTIALS_KEY,
                &json!({
                    "web-1": {
                        "host": "10.0.0.5",
                        "username": "deploy",
                        "port": 2222,
                        "ssh_key": "~/.ssh/id_ed25519"
                    }
                }),
            )
            .unwrap();
        Arc::new(vault)
    }

    fn empty_vault(dir: &TempDir) -> Arc<Vault> {
        Arc::new(Vault::with_key(dir.path().join(VAULT_FILE), &[0x42u8; 32]).unwrap())
    }

    #[tokio::test]
    async fn test_credentials_empty_when_absent() {
        let tmp = TempDir::new().unwrap();
        let agent = OpsAgent::new("ops", Arc::new(MockProvider), empty_vault(&tmp));
        assert!(agent.server_credentials().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_credentials_parse_and_default_port() {
        let tmp = TempDir::new().unwrap();
        let agent = OpsAgent::new("ops", Arc::new(MockProvider), vault_with_credentials(&tmp));
        let credentials = agent.server_credentials().await.unwrap();
        let cred = credentials.get("web-1").unwrap();
        assert_eq!(cred.host, "10.0.0.5");
        assert_eq!(cred.port, 2222);

        let bare: ServerCredential =
            serde_json::from_value(json!({ "host": "h", "username": "u" })).unwrap();
        assert_eq!(bare.port, 22);
        assert!(bare.ssh_key.is_none());
    }

    #[tokio::test]
    async fn test_credential_access_recorded() {
        let tmp = TempDir::new().unwrap();
        let store = ActivityStore::open_in_memory().unwrap();
        store
            .register_credential(SERVER_CREDENTIALS_KEY, None, None)
            .await
            .unwrap();
        let agent = OpsAgent::new("ops", Arc::new(MockProvider), vault_with_credentials(&tmp))
            .with_store(store.clone());

        agent.server_credentials().await.unwrap();
        agent.server_credentials().await.unwrap();

        let entry = store
            .credential(SERVER_CREDENTIALS_KEY)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.access_count, 2);
    }

    #[tokio::test]
    async fn test_execute_remote_unknown_server() {
        let tmp = TempDir::new().unwrap();
        let store = ActivityStore::open_in_memory().unwrap();
        let agent = OpsAgent::new("ops", Arc::new(MockProvider), vault_with_credentials(&tmp))
            .with_store(store.clone());

        let err = agent.execute_remote("db-9", "ls").await.unwrap_err();
        assert!(err.to_string().contains("db-9"));

        // The failed lookup itself lands in the command history.
        let history = store.command_history(Some("db-9"), 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, CommandStatus::Error);
        assert_eq!(history[0].executed_by, "ops");

        // And a failed metric row.
        let metrics = store.agent_metrics(&MetricsFilter::default()).await.unwrap();
        assert_eq!(metrics[0].request_kind, "remote_command");
        assert!(!metrics[0].success);
    }

    #[tokio::test]
    async fn test_process_message_delegates_to_llm() {
        let tmp = TempDir::new().unwrap();
        let agent = OpsAgent::new("ops", Arc::new(MockProvider), empty_vault(&tmp));
        let msg = Message::new("user", "ops", json!({ "content": "hello" }));
        let response = agent.process_message(&msg).await.unwrap();
        assert_eq!(response["response"], "ok");
        assert!(agent.act().await.unwrap().is_empty());
    }

    #[test]
    fn test_build_ssh_args() {
        let credential = ServerCredential {
            host: "10.0.0.5".into(),
            username: "deploy".into(),
            port: 2222,
            ssh_key: Some("/keys/id".into()),
        };
        let args = build_ssh_args(&credential, "ls -l ~");
        assert_eq!(
            args,
            vec![
                "-o",
                "BatchMode=yes",
                "-p",
                "2222",
                "-i",
                "/keys/id",
                "deploy@10.0.0.5",
                "ls -l ~",
            ]
        );
    }

    #[test]
    fn test_build_ssh_args_without_key() {
        let credential = ServerCredential {
            host: "h".into(),
            username: "u".into(),
            port: 22,
            ssh_key: None,
        };
        let args = build_ssh_args(&credential, "uptime");
        assert!(!args.contains(&"-i".to_string()));
        assert_eq!(args.last().unwrap(), "uptime");
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde("~/.ssh/id_rsa");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join(".ssh/id_rsa"));
        }
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
    }

    #[tokio::test]
    async fn test_malformed_credentials_is_error() {
        let tmp = TempDir::new().unwrap();
        let mut vault = Vault::with_key(tmp.path().join(VAULT_FILE), &[0x42u8; 32]).unwrap();
        vault
            .store(SERVER_CREDENTIALS_KEY, &json!("not a map"))
            .unwrap();
        let agent = OpsAgent::new("ops", Arc::new(MockProvider), Arc::new(vault));
        assert!(agent.server_credentials().await.is_err());
    }
}
