use std::sync::Arc;

use async_trait::async_trait;
use elv::{MessageContext, Outcome, Packet, Precondition, River, RiverError};
use tracing::info;

use super::{mottatt, videre};
use crate::domene::{AvkortingResultat, OmregningData, Revurderingaarsak, SakType};
use crate::hendelser::{
    Steg, AVKORTING_KEY, BEHANDLING_ID, BEREGNING_KEY, FORRIGE_BEHANDLING_ID, SAK_TYPE,
};
use crate::klient::AvkortingService;

pub const MANGLER_FORRIGE_AVKORTING: &str = "ManglerForrigeAvkorting";

/// Recomputes avkorting for income-tested saker after beregning.
pub struct OmregningAvkortingRiver {
    avkorting: Arc<dyn AvkortingService>,
}

impl OmregningAvkortingRiver {
    pub fn new(avkorting: Arc<dyn AvkortingService>) -> Self {
        Self { avkorting }
    }
}

#[async_trait]
impl River for OmregningAvkortingRiver {
    fn name(&self) -> &'static str {
        "omregning-avkorting"
    }

    fn preconditions(&self) -> Vec<Precondition> {
        vec![Precondition::events(Steg::Beregnet.i_alle_namespaces())
            .require_value(SAK_TYPE, SakType::Omstillingsstoenad.as_str())
            .require_keys([BEHANDLING_ID, FORRIGE_BEHANDLING_ID, BEREGNING_KEY])
            .reject_key(AVKORTING_KEY)]
    }

    async fn handle(&self, packet: Packet, _context: &MessageContext) -> Result<Outcome, RiverError> {
        let hendelse = mottatt(&packet)?;
        let data = OmregningData::fra_pakke(&packet)?;
        let behandling_id = data.behandling_id()?;
        let forrige_behandling_id = data.forrige_behandling_id()?;

        // Checked before anything is recomputed; retrying cannot make it appear.
        let forrige_avkorting = self
            .avkorting
            .hent_avkorting(forrige_behandling_id)
            .await?
            .ok_or_else(|| {
                RiverError::data_integrity(
                    MANGLER_FORRIGE_AVKORTING,
                    format!("forrige behandling {forrige_behandling_id} har ingen avkorting"),
                )
            })?;

        let avkorting = match data.revurderingaarsak {
            Revurderingaarsak::AarligInntektsjustering => {
                self.avkorting
                    .aarlig_inntektsjustering(behandling_id, forrige_behandling_id)
                    .await?
            }
            _ => {
                self.avkorting
                    .omregn_avkorting(behandling_id, forrige_behandling_id)
                    .await?
            }
        };
        info!(
            %behandling_id,
            revurderingaarsak = data.revurderingaarsak.as_str(),
            "avkorting omregnet"
        );

        let mut neste = packet;
        neste.set(
            AVKORTING_KEY,
            AvkortingResultat {
                avkorting,
                forrige_avkorting,
            },
        )?;
        Ok(Outcome::Publish(videre(neste, hendelse, Steg::Avkortet)))
    }
}
