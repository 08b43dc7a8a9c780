//! Message transport contract
//!
//! The agent consumes provisioning requests from one queue and publishes
//! status notices on an outbound topic. A broker binding implements
//! [`MessageTransport`]; [`MemoryTransport`] is an in-process broker.

use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// Buffered messages per subscription before publishers wait
pub const SUBSCRIPTION_BUFFER: usize = 64;

#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Start consuming a queue
    ///
    /// The receiver yields raw message bodies and ends when the subscription
    /// closes.
    async fn subscribe(&self, queue: &str) -> Result<mpsc::Receiver<Vec<u8>>>;

    /// Publish a message on a topic
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<()>;
}

/// In-process broker
///
/// Each queue has at most one subscriber. Every publish is also retained so
/// callers can inspect outbound traffic.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    subscribers: Mutex<HashMap<String, mpsc::Sender<Vec<u8>>>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages published on `topic`, oldest first
    pub fn published(&self, topic: &str) -> Vec<Vec<u8>> {
        self.published
            .lock()
            .map(|p| {
                p.iter()
                    .filter(|(t, _)| t == topic)
                    .map(|(_, body)| body.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// End the subscription on `queue`, as a broker disconnect would
    pub fn close(&self, queue: &str) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.remove(queue);
        }
    }

    fn sender(&self, topic: &str) -> Result<Option<mpsc::Sender<Vec<u8>>>> {
        let subscribers = self
            .subscribers
            .lock()
            .map_err(|_| Error::Transport("subscriber lock poisoned".to_string()))?;
        Ok(subscribers.get(topic).cloned())
    }
}

#[async_trait]
impl MessageTransport for MemoryTransport {
    async fn subscribe(&self, queue: &str) -> Result<mpsc::Receiver<Vec<u8>>> {
        let mut subscribers = self
            .subscribers
            .lock()
            .map_err(|_| Error::Transport("subscriber lock poisoned".to_string()))?;

        if subscribers.get(queue).is_some_and(|tx| !tx.is_closed()) {
            return Err(Error::Transport(format!(
                "queue '{}' already has a subscriber",
                queue
            )));
        }

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        subscribers.insert(queue.to_string(), tx);
        debug!(queue = %queue, "Subscribed");
        Ok(rx)
    }

    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<()> {
        if let Ok(mut published) = self.published.lock() {
            published.push((topic.to_string(), body.clone()));
        }

        if let Some(tx) = self.sender(topic)? {
            tx.send(body)
                .await
                .map_err(|_| Error::Transport(format!("subscriber of '{}' went away", topic)))?;
        }
        Ok(())
    }
}
