//! Housekeeping: log rotation cleanup, metric retention and vault backups.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use tracing::{info, warn};

use crate::error::Result;
use crate::storage::ActivityStore;
use crate::vault::VaultBackup;

/// Retention windows applied by [`MaintenanceManager::run`].
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Rotated log files older than this many days are deleted.
    pub log_days: u32,
    /// Metric rows older than this many days are deleted.
    pub metric_days: u32,
    /// Command-history rows older than this many days are deleted.
    pub command_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            log_days: 30,
            metric_days: 90,
            command_days: 90,
        }
    }
}

/// What one maintenance pass did.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub logs_removed: usize,
    pub metrics_removed: usize,
    pub commands_removed: usize,
    /// Stem of the vault backup taken during the pass, when one was possible.
    pub backup: Option<PathBuf>,
}

/// Runs housekeeping over the data directory and the activity store.
pub struct MaintenanceManager {
    store: ActivityStore,
    data_dir: PathBuf,
}

impl MaintenanceManager {
    pub fn new(store: ActivityStore, data_dir: PathBuf) -> Self {
        Self { store, data_dir }
    }

    /// Delete log files under `<data_dir>/logs` older than `days`.
    ///
    /// Matches any file with `.log` in its name, which covers both live files
    /// (`raido.log`) and rotations (`raido.log.3`).
    pub fn cleanup_logs(&self, days: u32) -> Result<usize> {
        let logs_dir = self.data_dir.join("logs");
        if !logs_dir.exists() {
            return Ok(0);
        }
        let cutoff = SystemTime::now() - Duration::from_secs(u64::from(days) * 86_400);

        let mut removed = 0;
        let mut stack = vec![logs_dir];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                let is_log = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.contains(".log"));
                if !is_log {
                    continue;
                }
                let stale = std::fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .map(|mtime| mtime < cutoff)
                    .unwrap_or(false);
                if stale {
                    match std::fs::remove_file(&path) {
                        Ok(()) => removed += 1,
                        Err(e) => warn!(path = %path.display(), "Failed to remove log: {}", e),
                    }
                }
            }
        }
        info!(removed, "Log cleanup finished");
        Ok(removed)
    }

    /// Run a full maintenance pass: logs, metrics, commands, vault backup.
    ///
    /// The backup step is skipped (not failed) when no vault exists yet.
    pub async fn run(&self, policy: RetentionPolicy) -> Result<MaintenanceReport> {
        let logs_removed = self.cleanup_logs(policy.log_days)?;
        let metrics_removed = self.store.prune_metrics(policy.metric_days).await?;
        let commands_removed = self.store.prune_commands(policy.command_days).await?;

        let backup_manager =
            VaultBackup::new(self.data_dir.clone(), self.data_dir.join("backups").join("vault"));
        let backup = match backup_manager.create() {
            Ok(stem) => Some(stem),
            Err(e) => {
                info!("Skipping vault backup: {}", e);
                None
            }
        };

        Ok(MaintenanceReport {
            logs_removed,
            metrics_removed,
            commands_removed,
            backup,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MetricRecord, MetricsFilter};
    use crate::vault::Vault;
    use serde_json::json;
    use tempfile::TempDir;

    fn manager(tmp: &TempDir) -> MaintenanceManager {
        MaintenanceManager::new(
            ActivityStore::open_in_memory().unwrap(),
            tmp.path().to_path_buf(),
        )
    }

    #[test]
    fn test_cleanup_logs_missing_dir() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(manager(&tmp).cleanup_logs(30).unwrap(), 0);
    }

    #[test]
    fn test_cleanup_logs_respects_cutoff_and_names() {
        let tmp = TempDir::new().unwrap();
        let logs = tmp.path().join("logs").join("agents");
        std::fs::create_dir_all(&logs).unwrap();
        std::fs::write(logs.join("helper.log"), "x").unwrap();
        std::fs::write(logs.join("helper.log.1"), "x").unwrap();
        std::fs::write(logs.join("notes.txt"), "x").unwrap();

        let mgr = manager(&tmp);
        // Everything is brand new: a 30-day window removes nothing.
        assert_eq!(mgr.cleanup_logs(30).unwrap(), 0);

        // With a zero-day window every log file is stale.
        std::thread::sleep(std::time::Duration::from_millis(150));
        assert_eq!(mgr.cleanup_logs(0).unwrap(), 2);
        assert!(logs.join("notes.txt").exists(), "non-log files survive");
    }

    #[tokio::test]
    async fn test_run_prunes_store_and_backs_up_vault() {
        let tmp = TempDir::new().unwrap();
        let store = ActivityStore::open_in_memory().unwrap();
        store
            .log_metric(&MetricRecord {
                agent_id: "a".into(),
                request_kind: "message".into(),
                processing_ms: 1.0,
                tokens_used: 1,
                success: true,
                error_message: None,
                extra: None,
            })
            .await
            .unwrap();

        // Seed a vault so the backup step has something to snapshot.
        let mut vault = Vault::open(tmp.path()).unwrap();
        vault.store("k", &json!("v")).unwrap();

        let mgr = MaintenanceManager::new(store.clone(), tmp.path().to_path_buf());
        let report = mgr.run(RetentionPolicy::default()).await.unwrap();

        assert_eq!(report.metrics_removed, 0, "fresh rows stay");
        assert!(report.backup.is_some());
        assert_eq!(
            store
                .agent_metrics(&MetricsFilter::default())
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_run_without_vault_skips_backup() {
        let tmp = TempDir::new().unwrap();
        let report = manager(&tmp).run(RetentionPolicy::default()).await.unwrap();
        assert!(report.backup.is_none());
    }
}
