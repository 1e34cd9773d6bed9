use std::sync::Arc;

use async_trait::async_trait;
use elv::{MessageContext, Outcome, Packet, Precondition, River, RiverError};
use tracing::info;

use super::{mottatt, videre};
use crate::domene::OmregningData;
use crate::hendelser::{Steg, BEHANDLING_ID, FORRIGE_BEHANDLING_ID, TRYGDETID_KOPIERT_KEY};
use crate::klient::TrygdetidService;

/// Copies trygdetid from the previous behandling as soon as the new one exists.
pub struct KopierTrygdetidRiver {
    trygdetid: Arc<dyn TrygdetidService>,
}

impl KopierTrygdetidRiver {
    pub fn new(trygdetid: Arc<dyn TrygdetidService>) -> Self {
        Self { trygdetid }
    }
}

#[async_trait]
impl River for KopierTrygdetidRiver {
    fn name(&self) -> &'static str {
        "kopier-trygdetid"
    }

    fn preconditions(&self) -> Vec<Precondition> {
        vec![Precondition::events(Steg::BehandlingOpprettet.i_alle_namespaces())
            .require_keys([BEHANDLING_ID, FORRIGE_BEHANDLING_ID])
            .reject_key(TRYGDETID_KOPIERT_KEY)]
    }

    async fn handle(&self, packet: Packet, _context: &MessageContext) -> Result<Outcome, RiverError> {
        let hendelse = mottatt(&packet)?;
        let data = OmregningData::fra_pakke(&packet)?;
        let behandling_id = data.behandling_id()?;
        let forrige_behandling_id = data.forrige_behandling_id()?;

        self.trygdetid
            .kopier_trygdetid(behandling_id, forrige_behandling_id)
            .await?;
        info!(%behandling_id, %forrige_behandling_id, "trygdetid kopiert");

        let mut neste = packet;
        neste.set(TRYGDETID_KOPIERT_KEY, true)?;
        Ok(Outcome::Publish(videre(neste, hendelse, Steg::TrygdetidKopiert)))
    }
}
