//! One river per saga stage.
//!
//! | river | listens to | adds | publishes |
//! |---|---|---|---|
//! | [`OverstyrtBeregningRiver`] | `REGULERING:LOEPENDE_YTELSE_FUNNET` | `overstyrt_beregning_kontrollert` | `REGULERING:KLAR_FOR_OMREGNING` |
//! | [`KopierTrygdetidRiver`] | `*:BEHANDLING_OPPRETTA` | `trygdetid_kopiert` | `*:TRYGDETID_KOPIERT` |
//! | [`OmregningBeregningRiver`] | `*:VILKAARSVURDERT` | `beregning` | `*:BEREGNA` |
//! | [`OmregningAvkortingRiver`] | `*:BEREGNA` (OMS) | `avkorting` | `*:AVKORTA` |
//! | [`VerifiserToleranseRiver`] | `*:BEREGNA` (BP), `*:AVKORTA` | `toleranse` | `*:VERIFISERT` |
//! | [`KlarForVedtakRiver`] | `*:VERIFISERT` | `klar_for_vedtak` | `*:KLAR_FOR_VEDTAK` |
//!
//! Every river rejects the key it adds, so a redelivered message is ignored.

mod avkorting;
mod beregning;
mod overstyrt;
mod toleranse;
mod trygdetid;
mod vedtak;

pub use avkorting::OmregningAvkortingRiver;
pub use beregning::OmregningBeregningRiver;
pub use overstyrt::OverstyrtBeregningRiver;
pub use toleranse::VerifiserToleranseRiver;
pub use trygdetid::KopierTrygdetidRiver;
pub use vedtak::KlarForVedtakRiver;

use std::sync::Arc;

use elv::{Packet, RapidsBuilder, RiverError};

use crate::hendelser::{Hendelse, Steg};
use crate::klient::{AvkortingService, BeregningService, TrygdetidService};

/// The domain services the rivers call.
#[derive(Clone)]
pub struct Tjenester {
    pub beregning: Arc<dyn BeregningService>,
    pub avkorting: Arc<dyn AvkortingService>,
    pub trygdetid: Arc<dyn TrygdetidService>,
}

/// Register every stage river.
pub fn registrer(builder: RapidsBuilder, tjenester: &Tjenester) -> RapidsBuilder {
    builder
        .with_river(OverstyrtBeregningRiver::new(Arc::clone(&tjenester.beregning)))
        .with_river(KopierTrygdetidRiver::new(Arc::clone(&tjenester.trygdetid)))
        .with_river(OmregningBeregningRiver::new(
            Arc::clone(&tjenester.beregning),
            Arc::clone(&tjenester.trygdetid),
        ))
        .with_river(OmregningAvkortingRiver::new(Arc::clone(&tjenester.avkorting)))
        .with_river(VerifiserToleranseRiver::new(Arc::clone(&tjenester.beregning)))
        .with_river(KlarForVedtakRiver)
}

/// The event the river was invoked with.
fn mottatt(packet: &Packet) -> Result<Hendelse, RiverError> {
    let navn = packet.event_name().unwrap_or_default();
    navn.parse::<Hendelse>()
        .map_err(|feil| RiverError::data_integrity("UkjentHendelse", feil.to_string()))
}

/// Hand the message on to `steg` in the same namespace.
fn videre(mut packet: Packet, fra: Hendelse, steg: Steg) -> Packet {
    packet.advance(fra.neste(steg).to_string());
    packet
}
