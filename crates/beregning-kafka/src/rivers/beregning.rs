use std::sync::Arc;

use async_trait::async_trait;
use elv::{MessageContext, Outcome, Packet, Precondition, River, RiverError};
use tracing::{debug, info};

use super::{mottatt, videre};
use crate::domene::{BeregningResultat, OmregningData, Revurderingaarsak};
use crate::hendelser::{
    Steg, BEHANDLING_ID, BEREGNING_KEY, FORRIGE_BEHANDLING_ID, SAK_TYPE, TRYGDETID_KOPIERT_KEY,
};
use crate::klient::{BeregningService, TrygdetidService};

/// Recomputes the beregning of the new behandling from the previous one.
///
/// Trygdetid must be in place before the basis is copied, so the river copies
/// it first unless an earlier stage already did. `trygdetid_kopiert` only
/// travels with the published message, so a redelivery after a later failure
/// in this river copies trygdetid again.
pub struct OmregningBeregningRiver {
    beregning: Arc<dyn BeregningService>,
    trygdetid: Arc<dyn TrygdetidService>,
}

impl OmregningBeregningRiver {
    pub fn new(beregning: Arc<dyn BeregningService>, trygdetid: Arc<dyn TrygdetidService>) -> Self {
        Self { beregning, trygdetid }
    }
}

#[async_trait]
impl River for OmregningBeregningRiver {
    fn name(&self) -> &'static str {
        "omregning-beregning"
    }

    fn preconditions(&self) -> Vec<Precondition> {
        vec![Precondition::events(Steg::Vilkaarsvurdert.i_alle_namespaces())
            .require_keys([BEHANDLING_ID, FORRIGE_BEHANDLING_ID, SAK_TYPE])
            .reject_key(BEREGNING_KEY)]
    }

    async fn handle(&self, packet: Packet, _context: &MessageContext) -> Result<Outcome, RiverError> {
        let hendelse = mottatt(&packet)?;
        let data = OmregningData::fra_pakke(&packet)?;
        let behandling_id = data.behandling_id()?;
        let forrige_behandling_id = data.forrige_behandling_id()?;
        let mut neste = packet;

        if !neste.contains(TRYGDETID_KOPIERT_KEY) {
            self.trygdetid
                .kopier_trygdetid(behandling_id, forrige_behandling_id)
                .await?;
            neste.set(TRYGDETID_KOPIERT_KEY, true)?;
            debug!(%behandling_id, "trygdetid kopiert før beregning");
        }

        self.beregning
            .opprett_beregningsgrunnlag_fra_forrige(behandling_id, forrige_behandling_id)
            .await?;
        if data.revurderingaarsak == Revurderingaarsak::Regulering {
            self.beregning
                .tilpass_overstyrt_beregningsgrunnlag_regulering(behandling_id)
                .await?;
        }

        let beregning = self.beregning.beregn(behandling_id).await?;
        let forrige_beregning = self
            .beregning
            .hent_beregning(forrige_behandling_id)
            .await?
            .ok_or_else(|| {
                RiverError::data_integrity(
                    "ManglerForrigeBeregning",
                    format!("forrige behandling {forrige_behandling_id} har ingen beregning"),
                )
            })?;
        info!(
            %behandling_id,
            perioder = beregning.beregningsperioder.len(),
            "beregning utført"
        );

        neste.set(
            BEREGNING_KEY,
            BeregningResultat {
                beregning,
                forrige_beregning,
            },
        )?;
        Ok(Outcome::Publish(videre(neste, hendelse, Steg::Beregnet)))
    }
}
