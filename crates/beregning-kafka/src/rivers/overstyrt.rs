use std::sync::Arc;

use async_trait::async_trait;
use elv::{MessageContext, Outcome, Packet, Precondition, River, RiverError};
use tracing::{info, warn};
use uuid::Uuid;

use super::{mottatt, videre};
use crate::domene::OverstyrtBeregning;
use crate::hendelser::{
    Hendelse, Namespace, Steg, AAPNE_BEHANDLINGER_KEY, OVERSTYRT_KONTROLLERT_KEY, SAK_ID,
};
use crate::klient::BeregningService;

pub const OVERSTYRT_PAA_AAPEN_BEHANDLING: &str = "OverstyrtBeregningPaaAapenBehandling";

/// Stops regulation of a sak when one of its open behandlinger has a
/// manually overridden beregning. Such a sak needs a caseworker.
pub struct OverstyrtBeregningRiver {
    beregning: Arc<dyn BeregningService>,
}

impl OverstyrtBeregningRiver {
    pub fn new(beregning: Arc<dyn BeregningService>) -> Self {
        Self { beregning }
    }
}

#[async_trait]
impl River for OverstyrtBeregningRiver {
    fn name(&self) -> &'static str {
        "overstyrt-beregning"
    }

    fn preconditions(&self) -> Vec<Precondition> {
        vec![Precondition::event(
            Hendelse::new(Namespace::Regulering, Steg::LoependeYtelseFunnet).to_string(),
        )
        .require_keys([SAK_ID, AAPNE_BEHANDLINGER_KEY])
        .reject_key(OVERSTYRT_KONTROLLERT_KEY)]
    }

    async fn handle(&self, packet: Packet, _context: &MessageContext) -> Result<Outcome, RiverError> {
        let hendelse = mottatt(&packet)?;
        let sak_id: i64 = packet.field(SAK_ID)?;
        let aapne_behandlinger: Vec<Uuid> = packet.field(AAPNE_BEHANDLINGER_KEY)?;

        for behandling_id in &aapne_behandlinger {
            match self.beregning.hent_overstyrt_beregning(*behandling_id).await? {
                OverstyrtBeregning::Ingen => {}
                OverstyrtBeregning::Finnes => {
                    return Err(RiverError::data_integrity(
                        OVERSTYRT_PAA_AAPEN_BEHANDLING,
                        format!(
                            "sak {sak_id} har en åpen behandling {behandling_id} med overstyrt beregning"
                        ),
                    ));
                }
                OverstyrtBeregning::Ukjent { status } => {
                    warn!(sak_id, %behandling_id, status, "kunne ikke avgjøre om beregningen er overstyrt");
                    return Err(RiverError::data_integrity(
                        OVERSTYRT_PAA_AAPEN_BEHANDLING,
                        format!(
                            "sak {sak_id}: oppslag av overstyrt beregning for åpen behandling {behandling_id} svarte {status}"
                        ),
                    ));
                }
            }
        }

        info!(sak_id, aapne = aapne_behandlinger.len(), "ingen overstyrt beregning på åpne behandlinger");
        let mut neste = packet;
        neste.set(OVERSTYRT_KONTROLLERT_KEY, true)?;
        Ok(Outcome::Publish(videre(neste, hendelse, Steg::KlarForOmregning)))
    }
}
