//! Testing utilities for rivers.
//!
//! [`TestRapid`] runs real [`Rapids`] dispatch against a bus that records
//! what gets published, so a test can send a message and inspect exactly what
//! came out:
//!
//! ```ignore
//! let rapid = TestRapid::new(Rapids::<RecordingBus>::builder().with_river(MyRiver));
//! rapid.send_test_message(json!({ "@event_name": "A", ... })).await;
//! assert_eq!(rapid.inspector().event_names(), vec!["B"]);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use elv::{DeliveryOutcome, MessageBus, Packet, Rapids, RapidsBuilder, FAILURE_EVENT_NAME};
use serde_json::Value;

/// Bus that keeps every published message in memory.
#[derive(Debug, Default)]
pub struct RecordingBus {
    published: Mutex<Vec<Packet>>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<Packet> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn len(&self) -> usize {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl MessageBus for RecordingBus {
    async fn publish(&self, packet: &Packet) -> Result<()> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(packet.clone());
        Ok(())
    }
}

pub struct TestRapid {
    rapids: Rapids<RecordingBus>,
    bus: Arc<RecordingBus>,
}

impl TestRapid {
    pub fn new(builder: RapidsBuilder) -> Self {
        let bus = Arc::new(RecordingBus::new());
        Self {
            rapids: builder.build(Arc::clone(&bus)),
            bus,
        }
    }

    pub fn rapids(&self) -> &Rapids<RecordingBus> {
        &self.rapids
    }

    /// Deliver one message, exactly as the bus would.
    pub async fn send_test_message(&self, message: Value) -> DeliveryOutcome {
        self.rapids.deliver(&message.to_string()).await
    }

    pub async fn send_packet(&self, packet: &Packet) -> DeliveryOutcome {
        self.rapids.deliver(&packet.to_json()).await
    }

    /// Deliver a message and keep feeding everything published back in, like
    /// a bus with every river attached, until nothing new is published.
    ///
    /// Stops after `max_deliveries` to catch accidental loops.
    pub async fn run_saga(&self, message: Value, max_deliveries: usize) -> Vec<DeliveryOutcome> {
        let mut queue = VecDeque::from([message.to_string()]);
        let mut outcomes = Vec::new();

        while let Some(raw) = queue.pop_front() {
            if outcomes.len() >= max_deliveries {
                break;
            }
            let before = self.bus.len();
            outcomes.push(self.rapids.deliver(&raw).await);
            queue.extend(
                self.bus.published()[before..]
                    .iter()
                    .map(Packet::to_json),
            );
        }
        outcomes
    }

    pub fn inspector(&self) -> Inspector {
        Inspector {
            messages: self.bus.published(),
        }
    }
}

/// Snapshot of everything published so far.
#[derive(Debug, Clone)]
pub struct Inspector {
    messages: Vec<Packet>,
}

impl Inspector {
    pub fn size(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn message(&self, index: usize) -> Option<&Packet> {
        self.messages.get(index)
    }

    pub fn last(&self) -> Option<&Packet> {
        self.messages.last()
    }

    pub fn messages(&self) -> &[Packet] {
        &self.messages
    }

    pub fn event_names(&self) -> Vec<&str> {
        self.messages
            .iter()
            .filter_map(Packet::event_name)
            .collect()
    }

    /// First published message with this event name.
    pub fn find(&self, event_name: &str) -> Option<&Packet> {
        self.messages
            .iter()
            .find(|packet| packet.event_name() == Some(event_name))
    }

    /// Failure envelopes published so far.
    pub fn failures(&self) -> Vec<&Packet> {
        self.messages
            .iter()
            .filter(|packet| packet.event_name() == Some(FAILURE_EVENT_NAME))
            .collect()
    }
}
