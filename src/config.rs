//! Runtime settings resolved from environment variables.
//!
//! Every knob has a default suitable for local development, can be overridden
//! through `RAIDO_*` environment variables, and honors a `.env` file in the
//! working directory. Library components take explicit paths/values in their
//! constructors; the process-wide [`settings()`] global exists for the CLI.

use std::path::PathBuf;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RaidoError, Result};

/// Default generation parameters applied when an agent spec leaves them unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmDefaults {
    /// Model identifier passed to the provider API.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token cap.
    pub max_tokens: u32,
}

impl Default for LlmDefaults {
    fn default() -> Self {
        Self {
            model: "claude-3-haiku-20240307".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

/// Global runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Root directory for runtime data (database, vault, logs, backups).
    pub data_dir: PathBuf,
    /// Directory scanned for agent definition files (`*.yaml`).
    pub agents_dir: PathBuf,
    /// SQLite database location.
    pub database_path: PathBuf,
    /// Redis connection URL for the cache/queue backend.
    pub redis_url: String,
    /// Provider used when an agent spec names none.
    pub default_provider: String,
    /// Generation defaults.
    pub llm: LlmDefaults,
    /// Anthropic API key, if configured.
    pub anthropic_api_key: Option<String>,
    /// OpenAI API key, if configured.
    pub openai_api_key: Option<String>,
    /// TTL applied to cached LLM responses.
    pub cache_ttl_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = PathBuf::from("data");
        Self {
            database_path: data_dir.join("raido.db"),
            data_dir,
            agents_dir: PathBuf::from("agents"),
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            default_provider: "anthropic".to_string(),
            llm: LlmDefaults::default(),
            anthropic_api_key: None,
            openai_api_key: None,
            cache_ttl_secs: 3600,
        }
    }
}

impl Settings {
    /// Build settings from the process environment.
    ///
    /// Loads a `.env` file first when present. Numeric variables that fail to
    /// parse are a hard configuration error rather than a silent default.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut settings = Settings::default();

        if let Some(dir) = env_var("RAIDO_DATA_DIR") {
            settings.data_dir = PathBuf::from(&dir);
            settings.database_path = settings.data_dir.join("raido.db");
        }
        if let Some(dir) = env_var("RAIDO_AGENTS_DIR") {
            settings.agents_dir = PathBuf::from(dir);
        }
        if let Some(path) = env_var("RAIDO_DATABASE_PATH") {
            settings.database_path = PathBuf::from(path);
        }
        if let Some(url) = env_var("RAIDO_REDIS_URL") {
            settings.redis_url = url;
        }
        if let Some(provider) = env_var("RAIDO_DEFAULT_PROVIDER") {
            settings.default_provider = provider;
        }
        if let Some(model) = env_var("RAIDO_MODEL") {
            settings.llm.model = model;
        }
        if let Some(raw) = env_var("RAIDO_TEMPERATURE") {
            settings.llm.temperature = parse_var("RAIDO_TEMPERATURE", &raw)?;
        }
        if let Some(raw) = env_var("RAIDO_MAX_TOKENS") {
            settings.llm.max_tokens = parse_var("RAIDO_MAX_TOKENS", &raw)?;
        }
        if let Some(raw) = env_var("RAIDO_CACHE_TTL_SECS") {
            settings.cache_ttl_secs = parse_var("RAIDO_CACHE_TTL_SECS", &raw)?;
        }
        settings.anthropic_api_key = env_var("ANTHROPIC_API_KEY");
        settings.openai_api_key = env_var("OPENAI_API_KEY");

        Ok(settings)
    }

    /// Create the data and agents directories when they do not exist.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.agents_dir)?;
        Ok(())
    }

    /// Directory holding rotated log files.
    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Directory holding vault backups.
    pub fn vault_backup_dir(&self) -> PathBuf {
        self.data_dir.join("backups").join("vault")
    }

    /// API key for a provider by name, if configured.
    pub fn api_key_for(&self, provider: &str) -> Option<&str> {
        match provider {
            "anthropic" => self.anthropic_api_key.as_deref(),
            "openai" => self.openai_api_key.as_deref(),
            _ => None,
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse().map_err(|_| {
        RaidoError::Config(format!("Invalid value for {}: {:?}", name, raw))
    })
}

static SETTINGS: Lazy<Settings> = Lazy::new(|| match Settings::from_env() {
    Ok(settings) => settings,
    Err(err) => {
        warn!("Falling back to default settings: {}", err);
        Settings::default()
    }
});

/// Process-wide settings, resolved once on first access.
pub fn settings() -> &'static Settings {
    &SETTINGS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.data_dir, PathBuf::from("data"));
        assert_eq!(settings.database_path, PathBuf::from("data/raido.db"));
        assert_eq!(settings.default_provider, "anthropic");
        assert_eq!(settings.llm.max_tokens, 1024);
        assert_eq!(settings.cache_ttl_secs, 3600);
        assert!(settings.anthropic_api_key.is_none());
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        let result: Result<u64> = parse_var("RAIDO_CACHE_TTL_SECS", "soon");
        assert!(matches!(result, Err(RaidoError::Config(_))));
    }

    #[test]
    fn test_parse_var_accepts_numbers() {
        let parsed: u64 = parse_var("RAIDO_CACHE_TTL_SECS", "120").unwrap();
        assert_eq!(parsed, 120);
    }

    #[test]
    fn test_api_key_for_unknown_provider() {
        let settings = Settings {
            anthropic_api_key: Some("sk-ant".into()),
            ..Settings::default()
        };
        assert_eq!(settings.api_key_for("anthropic"), Some("sk-ant"));
        assert!(settings.api_key_for("openai").is_none());
        assert!(settings.api_key_for("groq").is_none());
    }

    #[test]
    fn test_derived_dirs() {
        let settings = Settings::default();
        assert_eq!(settings.logs_dir(), PathBuf::from("data/logs"));
        assert_eq!(
            settings.vault_backup_dir(),
            PathBuf::from("data/backups/vault")
        );
    }
}
