//! Key-value cache providers.
//!
//! Two interchangeable backends implement [`CacheStore`]: an in-process map
//! with TTL expiry ([`MemoryCache`]) and a redis-backed store ([`RedisCache`])
//! that additionally exposes task queues and agent-state keys.

pub mod memory;
pub mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::Result;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

/// Common get/set/delete/flush surface shared by cache backends.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Store a value, optionally bounded by a TTL.
    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<()>;

    /// Fetch a value. Expired or absent keys return `None`.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Remove a key. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Drop every entry in the store.
    async fn flush(&self) -> Result<()>;
}

/// Cache key for an LLM response: SHA-256 over `(provider, model, prompt)`.
///
/// Fields are length-prefixed so `("a|b", "c")` and `("a", "b|c")` can never
/// collide on a separator.
pub fn response_key(provider: &str, model: &str, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    for field in [provider, model, prompt] {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    format!("llm:response:{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_key_deterministic() {
        let a = response_key("anthropic", "claude-3-haiku-20240307", "hello");
        let b = response_key("anthropic", "claude-3-haiku-20240307", "hello");
        assert_eq!(a, b);
    }

    #[test]
    fn test_response_key_prefix() {
        let key = response_key("anthropic", "m", "p");
        assert!(key.starts_with("llm:response:"));
    }

    #[test]
    fn test_response_key_field_aware() {
        let base = response_key("anthropic", "model-a", "hello");
        assert_ne!(base, response_key("openai", "model-a", "hello"));
        assert_ne!(base, response_key("anthropic", "model-b", "hello"));
        assert_ne!(base, response_key("anthropic", "model-a", "goodbye"));
    }

    #[test]
    fn test_response_key_no_separator_collision() {
        let a = response_key("a|b", "", "c");
        let b = response_key("a", "b", "c");
        assert_ne!(a, b, "length-prefixed encoding must prevent collisions");
    }
}
