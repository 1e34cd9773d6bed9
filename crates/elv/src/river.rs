use async_trait::async_trait;

use crate::context::MessageContext;
use crate::error::RiverError;
use crate::packet::Packet;
use crate::precondition::Precondition;

/// What a river wants done with the message after handling it.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Publish this new version of the message. It goes out as one message
    /// with every key the handler added, or not at all.
    Publish(Packet),
    /// Handled; nothing further to publish.
    Consumed,
}

/// A message handler bound to the bus by its preconditions.
///
/// Implementations must be stateless between messages: the same river
/// instance serves concurrent deliveries.
#[async_trait]
pub trait River: Send + Sync + 'static {
    /// Used in logs and failure envelopes.
    fn name(&self) -> &'static str;

    /// The river is invoked when *any* of these holds. Each one should reject
    /// the river's own output key so redelivery is a no-op.
    fn preconditions(&self) -> Vec<Precondition>;

    async fn handle(&self, packet: Packet, context: &MessageContext) -> Result<Outcome, RiverError>;
}
