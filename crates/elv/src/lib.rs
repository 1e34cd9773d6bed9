//! # Elv
//!
//! Rapids and rivers: independently deployable message handlers that
//! cooperate through an append-only message bus, with no central scheduler.
//!
//! ## Core Concepts
//!
//! - [`Packet`] = the message. An open JSON object that only ever grows.
//! - [`Precondition`] = when it is a river's turn. Event name plus
//!   require/reject/value clauses over the packet's keys.
//! - [`River`] = a handler. Runs when one of its preconditions holds and
//!   returns the next version of the packet.
//! - [`Rapids`] = the dispatcher binding rivers to one bus.
//!
//! The key principle: **the shape of the message is the schedule**. A stage
//! runs when its input keys are present and its own output key is not.
//!
//! ## Architecture
//!
//! ```text
//! Trigger (regulation job, migration)
//!     │
//!     ▼ publish
//! MessageBus ◄──────────────────────────────────────┐
//!     │                                             │
//!     ▼ Subscription::next_message()                │
//! Rapids::deliver()                                 │
//!     │                                             │
//!     ├─► River A preconditions ── no match         │
//!     │                                             │
//!     ├─► River B preconditions ── match            │
//!     │       │                                     │
//!     │       ▼ context::scope(correlation id)      │
//!     │   River B.handle() ── Outcome::Publish ─────┤
//!     │                                             │
//!     └─► River C preconditions ── match            │
//!             │                                     │
//!             ▼                                     │
//!         River C.handle() ── Err(kind) ── log, FEILA
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Packets are append-only** - `set` never overwrites; only
//!    `@event_name` is rewritten, via `advance`
//! 2. **Preconditions are pure** - evaluating one twice gives the same answer
//!    and touches nothing
//! 3. **Redelivery is a no-op** - every river rejects its own output key
//! 4. **All-or-nothing publish** - a handler returns the whole next packet;
//!    the framework publishes it as one message or not at all
//! 5. **Context is scoped** - correlation id lives for one river invocation
//! 6. **Policy by kind** - retry/halt/continue follows [`ErrorKind`]
//!
//! ## Example
//!
//! ```ignore
//! use elv::{InMemoryBus, MessageContext, Outcome, Packet, Precondition, Rapids, River, RiverError};
//!
//! struct Beregn;
//!
//! #[elv::async_trait]
//! impl River for Beregn {
//!     fn name(&self) -> &'static str {
//!         "beregning"
//!     }
//!
//!     fn preconditions(&self) -> Vec<Precondition> {
//!         vec![Precondition::event("OMREGNING:VILKAARSVURDERT")
//!             .require_key("hendelse_data.behandlingId")
//!             .reject_key("beregning")]
//!     }
//!
//!     async fn handle(&self, mut packet: Packet, _: &MessageContext) -> Result<Outcome, RiverError> {
//!         packet.set("beregning", serde_json::json!({ "beloep": 3000 }))?;
//!         packet.advance("OMREGNING:BEREGNA");
//!         Ok(Outcome::Publish(packet))
//!     }
//! }
//!
//! let bus = std::sync::Arc::new(InMemoryBus::new());
//! let rapids = Rapids::<InMemoryBus>::builder().with_river(Beregn).build(bus.clone());
//! rapids.run_until(bus.subscribe(), tokio::signal::ctrl_c().map(|_| ())).await?;
//! ```

mod bus;
pub mod context;
mod error;
mod inflight;
mod packet;
mod precondition;
mod rapids;
mod river;
mod stdio;

pub use crate::bus::{InMemoryBus, InMemorySubscription, MessageBus, Subscription};
pub use crate::context::MessageContext;
pub use crate::error::{Categorizable, ErrorKind, RiverError};
pub use crate::inflight::{InflightGuard, InflightTracker};
pub use crate::packet::{
    Packet, PacketError, CORRELATION_ID_KEY, CREATED_KEY, EVENT_NAME_KEY, MESSAGE_ID_KEY,
};
pub use crate::precondition::{Clause, Mismatch, Precondition};
pub use crate::rapids::{
    DeliveryOutcome, Rapids, RapidsBuilder, RapidsConfig, RiverOutcome, FAILURE_EVENT_NAME,
    FAILURE_KEY,
};
pub use crate::river::{Outcome, River};
pub use crate::stdio::{StdinSubscription, StdioBus};

// Re-export commonly used external types
pub use async_trait::async_trait;
