use std::sync::Arc;

use async_trait::async_trait;
use elv::{MessageContext, Outcome, Packet, Precondition, River, RiverError};
use tracing::{debug, info, warn};

use super::{mottatt, videre};
use crate::domene::{BeregningOgAvkorting, OmregningData, Revurderingaarsak, SakType};
use crate::hendelser::{Steg, AVKORTING_KEY, BEREGNING_KEY, SAK_TYPE, TOLERANSE_KEY};
use crate::klient::BeregningService;
use crate::toleranse::{verifiser, Kontroll, Toleransegrunnlag};

/// Last stop before vedtak: a regulated benefit must stay within the
/// tolerance limits. Runs after beregning for barnepensjon and after avkorting
/// for omstillingsstønad.
pub struct VerifiserToleranseRiver {
    beregning: Arc<dyn BeregningService>,
}

impl VerifiserToleranseRiver {
    pub fn new(beregning: Arc<dyn BeregningService>) -> Self {
        Self { beregning }
    }
}

#[async_trait]
impl River for VerifiserToleranseRiver {
    fn name(&self) -> &'static str {
        "verifiser-toleranse"
    }

    fn preconditions(&self) -> Vec<Precondition> {
        vec![
            Precondition::events(Steg::Beregnet.i_alle_namespaces())
                .require_value(SAK_TYPE, SakType::Barnepensjon.as_str())
                .require_key(BEREGNING_KEY)
                .reject_key(TOLERANSE_KEY),
            Precondition::events(Steg::Avkortet.i_alle_namespaces())
                .require_keys([BEREGNING_KEY, AVKORTING_KEY])
                .reject_key(TOLERANSE_KEY),
        ]
    }

    async fn handle(&self, packet: Packet, _context: &MessageContext) -> Result<Outcome, RiverError> {
        let hendelse = mottatt(&packet)?;
        let data = OmregningData::fra_pakke(&packet)?;

        let kontroll = if data.revurderingaarsak == Revurderingaarsak::Regulering {
            let resultat = BeregningOgAvkorting::fra_pakke(&packet)?;
            let grunnbeloep = self.beregning.hent_grunnbeloep(data.fradato).await?;
            let grunnlag = Toleransegrunnlag::fra(&resultat, data.fradato, &grunnbeloep)
                .map_err(RiverError::categorized)?;
            let advarsler = verifiser(&grunnlag).map_err(RiverError::categorized)?;

            for advarsel in &advarsler {
                warn!(
                    sak_id = data.sak_id,
                    kode = %advarsel.kode,
                    forventet = advarsel.forventet,
                    faktisk = advarsel.faktisk,
                    differanse = advarsel.differanse,
                    "regulert beløp avviker fra forventet"
                );
            }
            info!(
                sak_id = data.sak_id,
                forrige = grunnlag.forrige_ytelse,
                ny = grunnlag.ny_ytelse,
                "ytelse innenfor toleransegrensene"
            );
            Kontroll::kontrollert(&grunnlag, advarsler)
        } else {
            debug!(
                revurderingaarsak = data.revurderingaarsak.as_str(),
                "ikke regulering; toleranse ikke kontrollert"
            );
            Kontroll::ikke_kontrollert()
        };

        let mut neste = packet;
        neste.set(TOLERANSE_KEY, kontroll)?;
        Ok(Outcome::Publish(videre(neste, hendelse, Steg::Verifisert)))
    }
}
