//! Vault command handlers.

use anyhow::{bail, Result};
use serde_json::Value;

use raido::config::Settings;
use raido::storage::ActivityStore;
use raido::vault::{Vault, VaultBackup};

use super::VaultAction;

pub(crate) async fn cmd_vault(action: VaultAction) -> Result<()> {
    let settings = Settings::from_env()?;
    settings.ensure_dirs()?;

    match action {
        VaultAction::List => {
            let vault = Vault::open(&settings.data_dir)?;
            if vault.is_empty() {
                println!("Vault is empty.");
            } else {
                println!("Stored credentials:");
                for key in vault.keys() {
                    println!("  - {}", key);
                }
            }
        }
        VaultAction::Set { key, value } => {
            let mut vault = Vault::open(&settings.data_dir)?;
            // Accept structured values; fall back to a plain string.
            let value: Value =
                serde_json::from_str(&value).unwrap_or_else(|_| Value::String(value));
            vault.store(&key, &value)?;

            let store = ActivityStore::open(&settings.database_path)?;
            store.register_credential(&key, None, None).await?;
            println!("Stored credential '{}'.", key);
        }
        VaultAction::Get { key } => {
            let vault = Vault::open(&settings.data_dir)?;
            let value = vault.get(&key)?;

            let store = ActivityStore::open(&settings.database_path)?;
            store.touch_credential(&key).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        VaultAction::Delete { key } => {
            let mut vault = Vault::open(&settings.data_dir)?;
            if vault.delete(&key)? {
                println!("Deleted credential '{}'.", key);
            } else {
                bail!("No credential stored under '{}'", key);
            }
        }
        VaultAction::Backup => {
            let backup = VaultBackup::new(settings.data_dir.clone(), settings.vault_backup_dir());
            let stem = backup.create()?;
            println!("Backup written: {}", stem.display());
        }
        VaultAction::Restore { stem } => {
            let backup = VaultBackup::new(settings.data_dir.clone(), settings.vault_backup_dir());
            backup.restore(&stem)?;
            println!("Vault restored from {}", stem.display());
        }
        VaultAction::Backups => {
            let backup = VaultBackup::new(settings.data_dir.clone(), settings.vault_backup_dir());
            let backups = backup.list()?;
            if backups.is_empty() {
                println!("No backups found.");
            } else {
                println!("Vault backups:");
                for info in backups {
                    println!(
                        "  {}  {} credentials  (v{})  {}",
                        info.timestamp,
                        info.entries,
                        info.version,
                        info.stem.display()
                    );
                }
            }
        }
    }
    Ok(())
}
