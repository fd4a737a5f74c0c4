//! Message envelope and the inter-agent broker.
//!
//! The broker is a single-subscriber-per-key dispatch table: each receiver id
//! maps to exactly one handler, `publish` invokes that handler inline and
//! returns its response. There is no queuing, no retry and no backpressure —
//! delivery to an unknown receiver is a no-op that returns `None`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;

/// Coarse message category carried in the envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Command,
    Event,
}

/// A message exchanged between agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender: String,
    pub receiver: String,
    pub content: Value,
    #[serde(default)]
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Message {
    /// Create a text message with a fresh id and the current timestamp.
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>, content: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            receiver: receiver.into(),
            content,
            kind: MessageKind::Text,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// Override the message kind.
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attach metadata to the envelope.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// The prompt text carried by this message.
    ///
    /// Accepts either a bare JSON string or an object with a string `content`
    /// field; anything else is rendered as compact JSON so handlers always get
    /// *something* to work with.
    pub fn text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            Value::Object(map) => match map.get("content").and_then(Value::as_str) {
                Some(s) => s.to_string(),
                None => self.content.to_string(),
            },
            other => other.to_string(),
        }
    }
}

/// Receiver side of the broker.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process a delivered message and produce a response value.
    async fn handle(&self, message: Message) -> Result<Value>;
}

/// Routes messages to the handler registered under the receiver id.
#[derive(Default)]
pub struct MessageBroker {
    subscribers: RwLock<HashMap<String, Arc<dyn MessageHandler>>>,
}

impl MessageBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a receiver id, replacing any previous one.
    pub async fn subscribe(&self, receiver_id: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        let receiver_id = receiver_id.into();
        debug!(receiver = %receiver_id, "Broker subscription added");
        self.subscribers.write().await.insert(receiver_id, handler);
    }

    /// Remove the handler for a receiver id. Returns `true` if one existed.
    pub async fn unsubscribe(&self, receiver_id: &str) -> bool {
        self.subscribers.write().await.remove(receiver_id).is_some()
    }

    /// Deliver a message to its receiver's handler.
    ///
    /// Returns the handler's response, or `Ok(None)` when nobody is subscribed
    /// under `message.receiver`. Handler failures propagate to the caller.
    pub async fn publish(&self, message: Message) -> Result<Option<Value>> {
        let handler = {
            let subscribers = self.subscribers.read().await;
            subscribers.get(&message.receiver).cloned()
        };
        match handler {
            Some(handler) => {
                let response = handler.handle(message).await?;
                Ok(Some(response))
            }
            None => {
                debug!(receiver = %message.receiver, "Dropping message with no subscriber");
                Ok(None)
            }
        }
    }

    /// Number of registered subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Whether a receiver id has a handler registered.
    pub async fn is_subscribed(&self, receiver_id: &str) -> bool {
        self.subscribers.read().await.contains_key(receiver_id)
    }
}
