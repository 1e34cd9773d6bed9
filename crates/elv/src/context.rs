//! Per-message correlation context.
//!
//! Every river invocation runs inside [`scope`], which binds a
//! [`MessageContext`] in task-local storage and instruments the future with a
//! span carrying the same fields. Code deeper in the call chain (HTTP clients,
//! for instance) reads it with [`current`] or [`current_correlation_id`]. The
//! binding ends when the scoped future completes, whether it succeeded or not,
//! so nothing leaks into the next message.

use std::future::Future;

use tracing::{Instrument, Span};

use crate::packet::Packet;

tokio::task_local! {
    static MESSAGE_CONTEXT: MessageContext;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContext {
    pub correlation_id: String,
    pub event_name: String,
    pub river: &'static str,
    pub message_id: Option<String>,
    /// Recalculation run the message belongs to, when it carries one.
    pub kjoering: Option<String>,
}

impl MessageContext {
    pub fn for_packet(river: &'static str, correlation_id: String, packet: &Packet) -> Self {
        Self {
            correlation_id,
            event_name: packet.event_name().unwrap_or_default().to_string(),
            river,
            message_id: packet.message_id().map(str::to_string),
            kjoering: packet
                .get("hendelse_data.kjoering")
                .and_then(|value| value.as_str())
                .map(str::to_string),
        }
    }

    pub fn span(&self) -> Span {
        tracing::info_span!(
            "haandter_pakke",
            river = self.river,
            event_name = %self.event_name,
            correlation_id = %self.correlation_id,
            message_id = self.message_id.as_deref().unwrap_or("-"),
            kjoering = self.kjoering.as_deref().unwrap_or("-"),
        )
    }
}

/// Run `future` with `context` bound for its whole lifetime.
pub async fn scope<F>(context: MessageContext, future: F) -> F::Output
where
    F: Future,
{
    let span = context.span();
    MESSAGE_CONTEXT.scope(context, future.instrument(span)).await
}

/// The context of the message being handled by the current task, if any.
pub fn current() -> Option<MessageContext> {
    MESSAGE_CONTEXT.try_with(Clone::clone).ok()
}

pub fn current_correlation_id() -> Option<String> {
    MESSAGE_CONTEXT
        .try_with(|context| context.correlation_id.clone())
        .ok()
}
