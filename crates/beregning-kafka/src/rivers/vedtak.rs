use async_trait::async_trait;
use elv::{MessageContext, Outcome, Packet, Precondition, River, RiverError};
use tracing::info;

use super::{mottatt, videre};
use crate::hendelser::{Steg, BEREGNING_KEY, KLAR_FOR_VEDTAK_KEY, SAK_ID, TOLERANSE_KEY};

/// Terminal stage: the behandling is verified and can be sent to vedtak.
pub struct KlarForVedtakRiver;

#[async_trait]
impl River for KlarForVedtakRiver {
    fn name(&self) -> &'static str {
        "klar-for-vedtak"
    }

    fn preconditions(&self) -> Vec<Precondition> {
        vec![Precondition::events(Steg::Verifisert.i_alle_namespaces())
            .require_keys([BEREGNING_KEY, TOLERANSE_KEY])
            .reject_key(KLAR_FOR_VEDTAK_KEY)]
    }

    async fn handle(&self, packet: Packet, _context: &MessageContext) -> Result<Outcome, RiverError> {
        let hendelse = mottatt(&packet)?;
        let sak_id: Option<i64> = packet.optional_field(SAK_ID)?;
        info!(sak_id, "klar for vedtak");

        let mut neste = packet;
        neste.set(KLAR_FOR_VEDTAK_KEY, true)?;
        Ok(Outcome::Publish(videre(neste, hendelse, Steg::KlarForVedtak)))
    }
}
