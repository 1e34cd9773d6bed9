//! Message bus abstraction.
//!
//! The real bus (an ordered, at-least-once log) is not owned by this crate.
//! Rivers only need two capabilities from it: publish a message, and read the
//! next raw message. [`InMemoryBus`] is a broadcast-backed implementation used
//! for tests and local runs.
//!
//! ## Guarantees of `InMemoryBus`
//!
//! - **At-most-once delivery**: a subscriber that falls behind by more than the
//!   channel capacity skips the messages it missed (logged as lag)
//! - **In-memory only**: nothing is persisted

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::warn;

use crate::packet::Packet;

const DEFAULT_CAPACITY: usize = 1024;

/// Publishing side of the bus.
#[async_trait]
pub trait MessageBus: Send + Sync + 'static {
    async fn publish(&self, packet: &Packet) -> Result<()>;
}

/// Consuming side of the bus.
#[async_trait]
pub trait Subscription: Send {
    /// Next raw message, or `None` once the bus is closed. Must be
    /// cancellation safe: it is raced against shutdown.
    async fn next_message(&mut self) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct InMemoryBus {
    sender: broadcast::Sender<String>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> InMemorySubscription {
        InMemorySubscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Inject a raw message, e.g. from a trigger.
    pub fn send_raw(&self, raw: impl Into<String>) {
        // No subscribers is not an error for a fan-out log.
        let _ = self.sender.send(raw.into());
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, packet: &Packet) -> Result<()> {
        self.send_raw(packet.to_json());
        Ok(())
    }
}

#[derive(Debug)]
pub struct InMemorySubscription {
    receiver: broadcast::Receiver<String>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn next_message(&mut self) -> Option<String> {
        loop {
            match self.receiver.recv().await {
                Ok(raw) => return Some(raw),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagged behind the bus; messages skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
