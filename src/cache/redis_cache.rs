//! Redis-backed cache, task queues and agent-state keys.
//!
//! Values are stored as JSON strings. Beyond the plain [`CacheStore`] surface
//! this backend carries the queue and state conventions used by the runtime:
//! task queues live under `queue:<name>` lists and transient agent state under
//! `agent:state:<agent_id>` keys.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde_json::Value;
use tracing::debug;

use super::CacheStore;
use crate::error::Result;

/// Prefix for task queue lists.
fn queue_key(queue: &str) -> String {
    format!("queue:{}", queue)
}

/// Prefix for transient agent-state keys.
fn state_key(agent_id: &str) -> String {
    format!("agent:state:{}", agent_id)
}

/// Redis-backed [`CacheStore`] using a multiplexed async connection.
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    /// Connect to a redis server, e.g. `redis://127.0.0.1:6379/0`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        debug!(url = %url, "Connected to redis");
        Ok(Self { conn })
    }

    // ── Task queues ──────────────────────────────────────────────────────────

    /// Append a task to the tail of a queue.
    pub async fn push_task(&self, queue: &str, task: &Value) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.rpush(queue_key(queue), task.to_string()).await?;
        Ok(())
    }

    /// Pop the task at the head of a queue, if any.
    pub async fn pop_task(&self, queue: &str) -> Result<Option<Value>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.lpop(queue_key(queue), None).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Number of tasks waiting in a queue.
    pub async fn queue_len(&self, queue: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let len: i64 = conn.llen(queue_key(queue)).await?;
        Ok(len.max(0) as u64)
    }

    // ── Agent state ──────────────────────────────────────────────────────────

    /// Store an agent's transient state under its own key with a TTL.
    pub async fn set_agent_state(
        &self,
        agent_id: &str,
        state: &Value,
        ttl: Duration,
    ) -> Result<()> {
        self.set(&state_key(agent_id), state, Some(ttl)).await
    }

    /// Fetch an agent's transient state, if present.
    pub async fn get_agent_state(&self, agent_id: &str) -> Result<Option<Value>> {
        self.get(&state_key(agent_id)).await
    }

    /// Snapshot the state of every agent with a live state key.
    pub async fn all_agent_states(&self) -> Result<Vec<(String, Value)>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(state_key("*")).await?;
        let mut states = Vec::with_capacity(keys.len());
        for key in keys {
            let agent_id = match key.rsplit(':').next() {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => continue,
            };
            if let Some(state) = self.get(&key).await? {
                states.push((agent_id, state));
            }
        }
        states.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(states)
    }

    // ── Events ───────────────────────────────────────────────────────────────

    /// Publish an event on a pub/sub channel. Returns the receiver count.
    pub async fn publish_event(&self, channel: &str, event: &Value) -> Result<u64> {
        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(channel, event.to_string()).await?;
        Ok(receivers.max(0) as u64)
    }

    // ── Bulk cleanup ─────────────────────────────────────────────────────────

    /// Delete every key matching a glob pattern. Returns how many were removed.
    pub async fn clear_pattern(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: i64 = conn.del(keys).await?;
        Ok(removed.max(0) as u64)
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        let payload = value.to_string();
        match ttl {
            Some(ttl) => {
                // SET EX with a zero TTL is a redis error; clamp to 1 second.
                let secs = ttl.as_secs().max(1);
                let _: () = conn.set_ex(key, payload, secs).await?;
            }
            None => {
                let _: () = conn.set(key, payload).await?;
            }
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn flush(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Connection-level behavior needs a live server; these cover the key
    // schema the rest of the runtime relies on.

    #[test]
    fn test_queue_key_format() {
        assert_eq!(queue_key("tasks"), "queue:tasks");
        assert_eq!(queue_key("events"), "queue:events");
    }

    #[test]
    fn test_state_key_format() {
        assert_eq!(state_key("agent-1"), "agent:state:agent-1");
        assert_eq!(state_key("*"), "agent:state:*");
    }

    #[test]
    fn test_state_key_id_roundtrip() {
        let key = state_key("helper");
        assert_eq!(key.rsplit(':').next(), Some("helper"));
    }

    #[test]
    fn test_connect_rejects_malformed_url() {
        let err = redis::Client::open("not-a-url");
        assert!(err.is_err());
    }
}
