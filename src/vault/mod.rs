//! Encrypted credential store.
//!
//! Credentials are JSON values encrypted with XChaCha20-Poly1305 and persisted
//! as a single JSON map at `<dir>/vault.json`. Each entry carries its own
//! random 24-byte nonce, stored as `base64(nonce || ciphertext)`. The master
//! key lives hex-encoded at `<dir>/vault.key` (created on first open), or is
//! derived from a passphrase with Argon2id against a persisted salt.

pub mod backup;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{RaidoError, Result};

pub use backup::{BackupInfo, VaultBackup};

/// File name of the encrypted store inside the vault directory.
pub const VAULT_FILE: &str = "vault.json";
/// File name of the hex-encoded master key.
pub const KEY_FILE: &str = "vault.key";
/// File name of the key-derivation salt (passphrase mode).
pub const SALT_FILE: &str = "vault.salt";

const XNONCE_LEN: usize = 24;

/// File-backed encrypted key-value store for credentials.
pub struct Vault {
    path: PathBuf,
    cipher: XChaCha20Poly1305,
    entries: BTreeMap<String, String>,
}

impl Vault {
    /// Open (or initialize) the vault in `dir` using the key file.
    ///
    /// A missing key file is generated with a fresh random key; a missing
    /// store file starts the vault empty. A store file that exists but cannot
    /// be parsed is an error — it is never silently discarded.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let key = load_or_create_key(&dir.join(KEY_FILE))?;
        Self::with_key(dir.join(VAULT_FILE), &key)
    }

    /// Open the vault in `dir` with a key derived from `passphrase`.
    ///
    /// The Argon2id salt is persisted at `<dir>/vault.salt` on first use so
    /// the same passphrase derives the same key on later opens.
    pub fn open_with_passphrase(dir: &Path, passphrase: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let salt = load_or_create_salt(&dir.join(SALT_FILE))?;
        let mut key = [0u8; 32];
        argon2::Argon2::default()
            .hash_password_into(passphrase.as_bytes(), &salt, &mut key)
            .map_err(|e| RaidoError::Vault(format!("Key derivation failed: {}", e)))?;
        Self::with_key(dir.join(VAULT_FILE), &key)
    }

    /// Open a vault at an explicit store path with a raw 32-byte key.
    pub fn with_key(path: PathBuf, key: &[u8; 32]) -> Result<Self> {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
        let entries = load_entries(&path)?;
        Ok(Self {
            path,
            cipher,
            entries,
        })
    }

    /// Encrypt and persist a credential under `key`.
    pub fn store(&mut self, key: &str, value: &Value) -> Result<()> {
        let plaintext = serde_json::to_vec(value)?;
        let sealed = self.seal(&plaintext)?;
        self.entries.insert(key.to_string(), sealed);
        self.save()?;
        debug!(key = %key, "Stored vault credential");
        Ok(())
    }

    /// Decrypt and return the credential stored under `key`.
    pub fn get(&self, key: &str) -> Result<Value> {
        let sealed = self
            .entries
            .get(key)
            .ok_or_else(|| RaidoError::Vault(format!("Credential not found: {}", key)))?;
        let plaintext = self.unseal(sealed)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Remove a credential. Returns `true` if it existed.
    pub fn delete(&mut self, key: &str) -> Result<bool> {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.save()?;
            info!(key = %key, "Deleted vault credential");
        }
        Ok(removed)
    }

    /// Whether a credential exists under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Sorted credential keys. Values are only exposed through [`Vault::get`].
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Path of the backing store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── Sealing ──────────────────────────────────────────────────────────────

    fn seal(&self, plaintext: &[u8]) -> Result<String> {
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| RaidoError::Vault("Encryption failed".into()))?;
        let mut blob = nonce.to_vec();
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(blob))
    }

    fn unseal(&self, sealed: &str) -> Result<Vec<u8>> {
        let blob = BASE64
            .decode(sealed)
            .map_err(|e| RaidoError::Vault(format!("Invalid ciphertext encoding: {}", e)))?;
        if blob.len() <= XNONCE_LEN {
            return Err(RaidoError::Vault("Ciphertext too short".into()));
        }
        let (nonce, ciphertext) = blob.split_at(XNONCE_LEN);
        self.cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| RaidoError::Vault("Decryption failed (wrong key or corrupt data)".into()))
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, data)?;
        restrict_permissions(&self.path);
        Ok(())
    }
}

fn load_entries(path: &Path) -> Result<BTreeMap<String, String>> {
    match std::fs::read_to_string(path) {
        Ok(data) if data.trim().is_empty() => Ok(BTreeMap::new()),
        Ok(data) => serde_json::from_str(&data).map_err(|e| {
            RaidoError::Vault(format!(
                "Vault store at {} is corrupt: {}",
                path.display(),
                e
            ))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(e.into()),
    }
}

fn load_or_create_key(path: &Path) -> Result<[u8; 32]> {
    if path.exists() {
        let raw = std::fs::read_to_string(path)?;
        let bytes = hex::decode(raw.trim())
            .map_err(|e| RaidoError::Vault(format!("Invalid vault key file: {}", e)))?;
        bytes
            .try_into()
            .map_err(|_| RaidoError::Vault("Vault key must be 32 bytes".into()))
    } else {
        let key = XChaCha20Poly1305::generate_key(&mut OsRng);
        std::fs::write(path, hex::encode(key))?;
        restrict_permissions(path);
        info!(path = %path.display(), "Generated new vault master key");
        let mut out = [0u8; 32];
        out.copy_from_slice(&key);
        Ok(out)
    }
}

fn load_or_create_salt(path: &Path) -> Result<[u8; 32]> {
    if path.exists() {
        let raw = std::fs::read_to_string(path)?;
        let bytes = hex::decode(raw.trim())
            .map_err(|e| RaidoError::Vault(format!("Invalid vault salt file: {}", e)))?;
        bytes
            .try_into()
            .map_err(|_| RaidoError::Vault("Vault salt must be 32 bytes".into()))
    } else {
        // Key-sized random salt; only its unpredictability matters.
        let salt = XChaCha20Poly1305::generate_key(&mut OsRng);
        std::fs::write(path, hex::encode(salt))?;
        restrict_permissions(path);
        let mut out = [0u8; 32];
        out.copy_from_slice(&salt);
        Ok(out)
    }
}

fn restrict_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    let _ = path;
}
