//! Dispatch of bus messages to rivers.
//!
//! ```text
//! Subscription ──► Rapids::deliver(raw)
//!                     │ parse, ensure correlation id
//!                     ▼
//!        ┌──── River A.preconditions() ── no match ──► ignored
//!        ├──── River B.preconditions() ── match ─┐
//!        └──── River C.preconditions() ── match ─┤
//!                                                ▼
//!                         context::scope(handle) per river
//!                                                │
//!                 Ok(Publish) ──► bus.publish ◄──┤
//!                 Err(halting) ──► log (+ FEILA envelope), nothing else
//! ```

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use crate::bus::{MessageBus, Subscription};
use crate::context::{self, MessageContext};
use crate::error::{ErrorKind, RiverError};
use crate::inflight::InflightTracker;
use crate::packet::Packet;
use crate::precondition::Precondition;
use crate::river::{Outcome, River};

/// Event name of the failure envelope.
pub const FAILURE_EVENT_NAME: &str = "FEILA";
/// Key holding the failure details inside the envelope.
pub const FAILURE_KEY: &str = "feil";

#[derive(Debug, Clone)]
pub struct RapidsConfig {
    /// Upper bound on messages handled concurrently by [`Rapids::run_until`].
    pub max_in_flight: usize,
    /// Publish a `FEILA` envelope when a river halts a message.
    pub publish_failures: bool,
}

impl Default for RapidsConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 16,
            publish_failures: true,
        }
    }
}

/// Per-river result of one delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum RiverOutcome {
    Published { river: &'static str, event_name: String },
    Consumed { river: &'static str },
    Failed { river: &'static str, kind: ErrorKind, code: String },
    /// Same message already being handled by this river on another task.
    SkippedInFlight { river: &'static str },
}

/// What happened to one raw message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryOutcome {
    pub rivers: Vec<RiverOutcome>,
}

impl DeliveryOutcome {
    pub fn matched(&self) -> usize {
        self.rivers.len()
    }

    pub fn published(&self) -> Vec<&str> {
        self.rivers
            .iter()
            .filter_map(|outcome| match outcome {
                RiverOutcome::Published { event_name, .. } => Some(event_name.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<(&'static str, ErrorKind, &str)> {
        self.rivers
            .iter()
            .filter_map(|outcome| match outcome {
                RiverOutcome::Failed { river, kind, code } => Some((*river, *kind, code.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn is_ignored(&self) -> bool {
        self.rivers.is_empty()
    }
}

struct RegisteredRiver {
    river: Arc<dyn River>,
    preconditions: Vec<Precondition>,
}

impl RegisteredRiver {
    fn accepts(&self, packet: &Packet) -> bool {
        let mut mismatches = Vec::new();
        for precondition in &self.preconditions {
            match precondition.evaluate(packet) {
                Ok(()) => return true,
                Err(mismatch) => mismatches.push(mismatch),
            }
        }
        trace!(river = self.river.name(), ?mismatches, "preconditions not satisfied");
        false
    }
}

pub struct RapidsBuilder {
    rivers: Vec<RegisteredRiver>,
    config: RapidsConfig,
}

impl RapidsBuilder {
    pub fn new() -> Self {
        Self {
            rivers: Vec::new(),
            config: RapidsConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RapidsConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a river. Its preconditions are read once, here.
    pub fn with_river<R: River>(self, river: R) -> Self {
        self.with_shared_river(Arc::new(river))
    }

    pub fn with_shared_river(mut self, river: Arc<dyn River>) -> Self {
        let preconditions = river.preconditions();
        debug!(
            river = river.name(),
            events = ?preconditions.iter().flat_map(|p| p.event_names().iter()).collect::<Vec<_>>(),
            "river registered"
        );
        self.rivers.push(RegisteredRiver {
            river,
            preconditions,
        });
        self
    }

    pub fn build<B: MessageBus>(self, bus: Arc<B>) -> Rapids<B> {
        Rapids {
            rivers: self.rivers.into(),
            bus,
            inflight: InflightTracker::new(),
            config: self.config,
        }
    }
}

impl Default for RapidsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The set of rivers attached to one bus.
pub struct Rapids<B: MessageBus> {
    rivers: Arc<[RegisteredRiver]>,
    bus: Arc<B>,
    inflight: InflightTracker,
    config: RapidsConfig,
}

impl<B: MessageBus> Clone for Rapids<B> {
    fn clone(&self) -> Self {
        Self {
            rivers: Arc::clone(&self.rivers),
            bus: Arc::clone(&self.bus),
            inflight: self.inflight.clone(),
            config: self.config.clone(),
        }
    }
}

impl<B: MessageBus> Rapids<B> {
    pub fn builder() -> RapidsBuilder {
        RapidsBuilder::new()
    }

    pub fn bus(&self) -> &Arc<B> {
        &self.bus
    }

    pub fn river_names(&self) -> Vec<&'static str> {
        self.rivers.iter().map(|r| r.river.name()).collect()
    }

    /// Offer one raw message to every river.
    pub async fn deliver(&self, raw: &str) -> DeliveryOutcome {
        let mut packet = match Packet::from_json(raw) {
            Ok(packet) => packet,
            Err(error) => {
                warn!(%error, "ignoring message that is not a JSON object");
                return DeliveryOutcome::default();
            }
        };
        if packet.event_name().is_none() {
            debug!("ignoring message without event name");
            return DeliveryOutcome::default();
        }
        if packet.correlation_id().is_none() {
            let generated = packet.ensure_correlation_id();
            warn!(
                correlation_id = %generated,
                event_name = packet.event_name().unwrap_or_default(),
                "message had no correlation id; generated one"
            );
        }

        self.deliver_packet(packet).await
    }

    pub async fn deliver_packet(&self, packet: Packet) -> DeliveryOutcome {
        let matching: Vec<&RegisteredRiver> =
            self.rivers.iter().filter(|r| r.accepts(&packet)).collect();

        let rivers = join_all(
            matching
                .into_iter()
                .map(|registered| self.run_river(registered, packet.clone())),
        )
        .await;

        DeliveryOutcome { rivers }
    }

    async fn run_river(&self, registered: &RegisteredRiver, packet: Packet) -> RiverOutcome {
        let river = registered.river.as_ref();
        let name = river.name();

        let _claim = match packet.message_id() {
            Some(message_id) => match self.inflight.try_begin(name, message_id) {
                Some(guard) => Some(guard),
                None => {
                    debug!(river = name, message_id, "message already in flight for river; skipping");
                    return RiverOutcome::SkippedInFlight { river: name };
                }
            },
            None => None,
        };

        let correlation_id = packet.correlation_id().unwrap_or_default().to_string();
        let message_context = MessageContext::for_packet(name, correlation_id, &packet);

        context::scope(message_context.clone(), async {
            debug!("preconditions satisfied; handling message");
            match river.handle(packet.clone(), &message_context).await {
                Ok(Outcome::Publish(mut next)) => {
                    next.stamp();
                    let event_name = next.event_name().unwrap_or_default().to_string();
                    match self.bus.publish(&next).await {
                        Ok(()) => {
                            info!(next_event = %event_name, "published");
                            RiverOutcome::Published { river: name, event_name }
                        }
                        Err(error) => {
                            error!(error = ?error, "publish failed; message not advanced");
                            RiverOutcome::Failed {
                                river: name,
                                kind: ErrorKind::Transient,
                                code: "PubliseringFeilet".to_string(),
                            }
                        }
                    }
                }
                Ok(Outcome::Consumed) => {
                    debug!("handled without follow-up message");
                    RiverOutcome::Consumed { river: name }
                }
                Err(err) if !err.kind().halts_message() => {
                    warn!(code = err.code(), error = %err, "advisory raised by river");
                    RiverOutcome::Consumed { river: name }
                }
                Err(err) => {
                    error!(
                        kind = %err.kind(),
                        code = err.code(),
                        error = %err,
                        source = ?std::error::Error::source(&err).map(ToString::to_string),
                        "river failed; message not advanced"
                    );
                    if self.config.publish_failures {
                        self.publish_failure(&packet, name, &err).await;
                    }
                    RiverOutcome::Failed {
                        river: name,
                        kind: err.kind(),
                        code: err.code().to_string(),
                    }
                }
            }
        })
        .await
    }

    async fn publish_failure(&self, original: &Packet, river: &'static str, err: &RiverError) {
        let envelope = failure_envelope(original, river, err);
        if let Err(error) = self.bus.publish(&envelope).await {
            error!(error = ?error, "could not publish failure envelope");
        }
    }

    /// Consume the subscription until it closes or `shutdown` resolves.
    ///
    /// Messages are handled concurrently, bounded by `max_in_flight`. On
    /// shutdown no new messages are read and handlers already running are
    /// allowed to finish.
    pub async fn run_until<S, F>(&self, mut subscription: S, shutdown: F) -> Result<()>
    where
        S: Subscription,
        F: Future<Output = ()>,
    {
        let permits = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        info!(rivers = ?self.river_names(), "rapids started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested; draining in-flight messages");
                    break;
                }
                next = subscription.next_message() => {
                    let Some(raw) = next else {
                        info!("bus closed");
                        break;
                    };
                    let permit = Arc::clone(&permits).acquire_owned().await?;
                    let rapids = self.clone();
                    tasks.spawn(async move {
                        let _permit = permit;
                        rapids.deliver(&raw).await
                    });
                    while let Some(joined) = tasks.try_join_next() {
                        if let Err(error) = joined {
                            error!(%error, "message handler task panicked");
                        }
                    }
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(error) = joined {
                error!(%error, "message handler task panicked");
            }
        }
        info!("rapids stopped");
        Ok(())
    }
}

/// The original message, renamed to `FEILA`, with the failure attached.
fn failure_envelope(original: &Packet, river: &'static str, err: &RiverError) -> Packet {
    let mut fields = match original.as_value() {
        serde_json::Value::Object(fields) => fields,
        _ => serde_json::Map::new(),
    };
    fields.insert(
        FAILURE_KEY.to_string(),
        json!({
            "river": river,
            "feilendeSteg": original.event_name(),
            "type": err.kind().as_str(),
            "kode": err.code(),
            "melding": err.message(),
        }),
    );
    let mut envelope = Packet::from_value(serde_json::Value::Object(fields))
        .unwrap_or_else(|_| Packet::new(FAILURE_EVENT_NAME));
    envelope.advance(FAILURE_EVENT_NAME);
    envelope.stamp();
    envelope
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRiver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl River for Arc<CountingRiver> {
        fn name(&self) -> &'static str {
            "teller"
        }

        fn preconditions(&self) -> Vec<Precondition> {
            vec![Precondition::event("A").reject_key("talt")]
        }

        async fn handle(&self, mut packet: Packet, _: &MessageContext) -> Result<Outcome, RiverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            packet.set("talt", true)?;
            packet.advance("B");
            Ok(Outcome::Publish(packet))
        }
    }

    struct FailingRiver(ErrorKind);

    #[async_trait]
    impl River for FailingRiver {
        fn name(&self) -> &'static str {
            "feiler"
        }

        fn preconditions(&self) -> Vec<Precondition> {
            vec![Precondition::event("A")]
        }

        async fn handle(&self, _: Packet, _: &MessageContext) -> Result<Outcome, RiverError> {
            Err(RiverError::new(self.0, "Testfeil", "det gikk galt"))
        }
    }

    fn rapids_with(builder: RapidsBuilder) -> (Rapids<InMemoryBus>, crate::bus::InMemorySubscription) {
        let bus = Arc::new(InMemoryBus::new());
        let subscription = bus.subscribe();
        (builder.build(bus), subscription)
    }

    #[tokio::test]
    async fn test_unmatched_message_is_ignored() {
        let river = Arc::new(CountingRiver::default());
        let (rapids, _sub) = rapids_with(Rapids::<InMemoryBus>::builder().with_river(river.clone()));

        let outcome = rapids.deliver(&Packet::new("C").to_json()).await;

        assert!(outcome.is_ignored());
        assert_eq!(river.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_matched_message_is_published_with_new_id() {
        let river = Arc::new(CountingRiver::default());
        let (rapids, mut sub) = rapids_with(Rapids::<InMemoryBus>::builder().with_river(river.clone()));
        let input = Packet::new("A");

        let outcome = rapids.deliver(&input.to_json()).await;

        assert_eq!(outcome.published(), vec!["B"]);
        let published = Packet::from_json(&sub.next_message().await.unwrap()).unwrap();
        assert_eq!(published.event_name(), Some("B"));
        assert_eq!(published.correlation_id(), input.correlation_id());
        assert_ne!(published.message_id(), input.message_id());
        assert_eq!(published.get("talt"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn test_redelivery_of_own_output_is_noop() {
        let river = Arc::new(CountingRiver::default());
        let (rapids, mut sub) = rapids_with(Rapids::<InMemoryBus>::builder().with_river(river.clone()));

        rapids.deliver(&Packet::new("A").to_json()).await;
        let mut published = Packet::from_json(&sub.next_message().await.unwrap()).unwrap();
        // Simulate the bus redelivering the output under the input's event name.
        published.advance("A");
        let outcome = rapids.deliver(&published.to_json()).await;

        assert!(outcome.is_ignored());
        assert_eq!(river.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_halting_failure_publishes_only_envelope() {
        let (rapids, mut sub) = rapids_with(
            Rapids::<InMemoryBus>::builder().with_river(FailingRiver(ErrorKind::BusinessInvariant)),
        );

        let outcome = rapids.deliver(&Packet::new("A").to_json()).await;

        assert_eq!(outcome.failures(), vec![("feiler", ErrorKind::BusinessInvariant, "Testfeil")]);
        assert!(outcome.published().is_empty());
        let envelope = Packet::from_json(&sub.next_message().await.unwrap()).unwrap();
        assert_eq!(envelope.event_name(), Some(FAILURE_EVENT_NAME));
        assert_eq!(envelope.get("feil.kode"), Some(&Value::from("Testfeil")));
        assert_eq!(envelope.get("feil.feilendeSteg"), Some(&Value::from("A")));
        assert_eq!(envelope.get("feil.type"), Some(&Value::from("business_invariant")));
    }

    #[tokio::test]
    async fn test_failure_envelope_can_be_disabled() {
        let builder = Rapids::<InMemoryBus>::builder()
            .with_config(RapidsConfig {
                publish_failures: false,
                ..RapidsConfig::default()
            })
            .with_river(FailingRiver(ErrorKind::DataIntegrity));
        let (rapids, mut sub) = rapids_with(builder);

        rapids.deliver(&Packet::new("A").to_json()).await;
        rapids.bus().send_raw("sentinel");

        assert_eq!(sub.next_message().await.as_deref(), Some("sentinel"));
    }

    #[tokio::test]
    async fn test_advisory_error_does_not_publish() {
        let (rapids, mut sub) =
            rapids_with(Rapids::<InMemoryBus>::builder().with_river(FailingRiver(ErrorKind::Advisory)));

        let outcome = rapids.deliver(&Packet::new("A").to_json()).await;
        rapids.bus().send_raw("sentinel");

        assert_eq!(outcome.rivers, vec![RiverOutcome::Consumed { river: "feiler" }]);
        assert_eq!(sub.next_message().await.as_deref(), Some("sentinel"));
    }

    #[tokio::test]
    async fn test_garbage_is_ignored() {
        let river = Arc::new(CountingRiver::default());
        let (rapids, _sub) = rapids_with(Rapids::<InMemoryBus>::builder().with_river(river.clone()));

        assert!(rapids.deliver("not json").await.is_ignored());
        assert!(rapids.deliver("{\"uten\":\"eventnavn\"}").await.is_ignored());
        assert_eq!(river.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_correlation_id_is_generated() {
        let river = Arc::new(CountingRiver::default());
        let (rapids, mut sub) = rapids_with(Rapids::<InMemoryBus>::builder().with_river(river));

        rapids.deliver("{\"@event_name\":\"A\"}").await;

        let published = Packet::from_json(&sub.next_message().await.unwrap()).unwrap();
        assert!(published.correlation_id().is_some());
    }

    #[tokio::test]
    async fn test_run_until_drains_bus_then_stops() {
        let river = Arc::new(CountingRiver::default());
        let bus = Arc::new(InMemoryBus::new());
        let rapids = Rapids::<InMemoryBus>::builder()
            .with_river(river.clone())
            .build(Arc::clone(&bus));
        let subscription = bus.subscribe();

        for _ in 0..3 {
            bus.send_raw(Packet::new("A").to_json());
        }
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn({
            let rapids = rapids.clone();
            async move {
                rapids
                    .run_until(subscription, async {
                        let _ = stop_rx.await;
                    })
                    .await
            }
        });

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while river.calls.load(Ordering::SeqCst) < 3 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();

        assert_eq!(river.calls.load(Ordering::SeqCst), 3);
    }
}
