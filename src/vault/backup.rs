//! Timestamped vault backups.
//!
//! A backup is three sibling files sharing a stem:
//! `vault_backup_<YYYYmmdd_HHMMSS>.json` (encrypted store),
//! `vault_backup_<...>.key` (key material — the master key file, or the salt
//! file for passphrase vaults) and `vault_backup_<...>.meta` (JSON metadata).
//! Entries are counted without decrypting anything.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{KEY_FILE, SALT_FILE, VAULT_FILE};
use crate::error::{RaidoError, Result};

/// Metadata written next to every backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupInfo {
    /// Timestamp used in the backup file names (`YYYYmmdd_HHMMSS`).
    pub timestamp: String,
    /// Crate version that wrote the backup.
    pub version: String,
    /// Number of credentials in the backed-up store.
    pub entries: usize,
    /// Which key material file was captured (`vault.key` or `vault.salt`).
    pub key_file: String,
    /// Backup stem (path without extension), filled in when listing.
    #[serde(skip)]
    pub stem: PathBuf,
}

/// Creates, restores and lists vault backups.
pub struct VaultBackup {
    vault_dir: PathBuf,
    backup_dir: PathBuf,
}

impl VaultBackup {
    pub fn new(vault_dir: PathBuf, backup_dir: PathBuf) -> Self {
        Self {
            vault_dir,
            backup_dir,
        }
    }

    /// Snapshot the live vault. Returns the backup stem.
    pub fn create(&self) -> Result<PathBuf> {
        let store_path = self.vault_dir.join(VAULT_FILE);
        if !store_path.exists() {
            return Err(RaidoError::Vault(format!(
                "Nothing to back up: {} does not exist",
                store_path.display()
            )));
        }
        let key_file = self.live_key_file()?;

        std::fs::create_dir_all(&self.backup_dir)?;
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let stem = self.backup_dir.join(format!("vault_backup_{}", timestamp));

        std::fs::copy(&store_path, stem.with_extension("json"))?;
        std::fs::copy(self.vault_dir.join(&key_file), stem.with_extension("key"))?;

        let info = BackupInfo {
            timestamp,
            version: env!("CARGO_PKG_VERSION").to_string(),
            entries: count_entries(&store_path)?,
            key_file,
            stem: stem.clone(),
        };
        std::fs::write(
            stem.with_extension("meta"),
            serde_json::to_string_pretty(&info)?,
        )?;

        info!(stem = %stem.display(), entries = info.entries, "Created vault backup");
        Ok(stem)
    }

    /// Restore a backup over the live vault.
    ///
    /// All three backup files must exist; a partial backup is rejected before
    /// anything is overwritten.
    pub fn restore(&self, stem: &Path) -> Result<()> {
        for ext in ["json", "key", "meta"] {
            if !stem.with_extension(ext).exists() {
                return Err(RaidoError::Vault(format!(
                    "Backup incomplete or corrupt: missing {}",
                    stem.with_extension(ext).display()
                )));
            }
        }

        let info = read_meta(&stem.with_extension("meta"))?;
        std::fs::create_dir_all(&self.vault_dir)?;
        std::fs::copy(stem.with_extension("json"), self.vault_dir.join(VAULT_FILE))?;
        std::fs::copy(
            stem.with_extension("key"),
            self.vault_dir.join(&info.key_file),
        )?;

        info!(stem = %stem.display(), "Restored vault backup");
        Ok(())
    }

    /// All backups in the backup directory, newest first.
    pub fn list(&self) -> Result<Vec<BackupInfo>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }
        let mut backups = Vec::new();
        for entry in std::fs::read_dir(&self.backup_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("meta") {
                continue;
            }
            let mut info = read_meta(&path)?;
            info.stem = path.with_extension("");
            backups.push(info);
        }
        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(backups)
    }

    fn live_key_file(&self) -> Result<String> {
        if self.vault_dir.join(KEY_FILE).exists() {
            Ok(KEY_FILE.to_string())
        } else if self.vault_dir.join(SALT_FILE).exists() {
            Ok(SALT_FILE.to_string())
        } else {
            Err(RaidoError::Vault(
                "No key material to back up (neither vault.key nor vault.salt exists)".into(),
            ))
        }
    }
}

fn count_entries(store_path: &Path) -> Result<usize> {
    let raw = std::fs::read_to_string(store_path)?;
    if raw.trim().is_empty() {
        return Ok(0);
    }
    let entries: BTreeMap<String, String> = serde_json::from_str(&raw)
        .map_err(|e| RaidoError::Vault(format!("Vault store is corrupt: {}", e)))?;
    Ok(entries.len())
}

fn read_meta(path: &Path) -> Result<BackupInfo> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|e| RaidoError::Vault(format!("Backup metadata is corrupt: {}", e)))
}
