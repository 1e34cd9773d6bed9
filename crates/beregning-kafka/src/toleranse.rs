//! Safety limits a regulated benefit must respect before it may be paid out.
//!
//! Two hard limits and one soft one:
//!
//! - the benefit may never go down under automatic regulation
//! - it may not go up by more than [`MAKS_OEKNING`] (numerator/denominator)
//! - it should move in proportion to the grunnbeløp; drift beyond
//!   [`AVRUNDINGSTOLERANSE`] is reported as an [`Advarsel`] and nothing more

use chrono::NaiveDate;
use elv::{Categorizable, ErrorKind};
use serde::{Deserialize, Serialize};

use crate::domene::{periode_paa_eller_foer, BeregningOgAvkorting, Grunnbeloep};

/// Largest accepted increase, as a ratio: 3/2 = 1.50×.
pub const MAKS_OEKNING: (i64, i64) = (3, 2);

/// Whole currency units of drift tolerated in the proportional check.
pub const AVRUNDINGSTOLERANSE: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToleranseFeil {
    #[error("ny ytelse {ny} er lavere enn ytelsen {forrige} i forrige behandling")]
    MindreEnnForrigeBehandling { forrige: i64, ny: i64 },

    #[error("ny ytelse {ny} er mer enn 1,5 ganger ytelsen {forrige} i forrige behandling")]
    ForStorOekning { forrige: i64, ny: i64 },

    #[error("{hva} har ingen periode som gjelder {dato}")]
    ManglerPeriode { hva: &'static str, dato: NaiveDate },
}

impl Categorizable for ToleranseFeil {
    fn kind(&self) -> ErrorKind {
        match self {
            ToleranseFeil::MindreEnnForrigeBehandling { .. }
            | ToleranseFeil::ForStorOekning { .. } => ErrorKind::BusinessInvariant,
            ToleranseFeil::ManglerPeriode { .. } => ErrorKind::DataIntegrity,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ToleranseFeil::MindreEnnForrigeBehandling { .. } => "MindreEnnForrigeBehandling",
            ToleranseFeil::ForStorOekning { .. } => "ForStorOekning",
            ToleranseFeil::ManglerPeriode { .. } => "ManglerPeriode",
        }
    }
}

/// Soft finding: recorded and logged, never blocking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Advarsel {
    pub kode: String,
    pub forventet: i64,
    pub faktisk: i64,
    pub differanse: i64,
}

/// Content of the `toleranse` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kontroll {
    /// `false` when the run is not a regulation and nothing was checked.
    pub kontrollert: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forrige_ytelse: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ny_ytelse: Option<i64>,
    #[serde(default)]
    pub advarsler: Vec<Advarsel>,
}

impl Kontroll {
    pub fn ikke_kontrollert() -> Self {
        Self {
            kontrollert: false,
            forrige_ytelse: None,
            ny_ytelse: None,
            advarsler: Vec::new(),
        }
    }

    pub fn kontrollert(grunnlag: &Toleransegrunnlag, advarsler: Vec<Advarsel>) -> Self {
        Self {
            kontrollert: true,
            forrige_ytelse: Some(grunnlag.forrige_ytelse),
            ny_ytelse: Some(grunnlag.ny_ytelse),
            advarsler,
        }
    }
}

/// The numbers the check looks at, all taken at the regulation date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toleransegrunnlag {
    /// What is paid out: after avkorting for income-tested benefits.
    pub forrige_ytelse: i64,
    pub ny_ytelse: i64,
    /// Computed benefit before avkorting; this is what follows the grunnbeløp.
    pub forrige_beregnet: i64,
    pub ny_beregnet: i64,
    pub forrige_grunnbeloep: i64,
    pub ny_grunnbeloep: i64,
}

impl Toleransegrunnlag {
    /// Pick the amounts in effect at `dato` out of new and previous results.
    pub fn fra(
        resultat: &BeregningOgAvkorting,
        dato: NaiveDate,
        grunnbeloep: &Grunnbeloep,
    ) -> Result<Self, ToleranseFeil> {
        let ny = periode_paa_eller_foer(&resultat.beregning.beregningsperioder, dato)
            .ok_or(ToleranseFeil::ManglerPeriode { hva: "beregning", dato })?;
        let forrige = periode_paa_eller_foer(&resultat.forrige_beregning.beregningsperioder, dato)
            .ok_or(ToleranseFeil::ManglerPeriode {
                hva: "forrige beregning",
                dato,
            })?;

        let (ny_ytelse, forrige_ytelse) = match &resultat.avkorting {
            Some(avkorting) => {
                let ny = periode_paa_eller_foer(&avkorting.avkorting.avkortet_ytelse, dato).ok_or(
                    ToleranseFeil::ManglerPeriode { hva: "avkorting", dato },
                )?;
                let forrige =
                    periode_paa_eller_foer(&avkorting.forrige_avkorting.avkortet_ytelse, dato)
                        .ok_or(ToleranseFeil::ManglerPeriode {
                            hva: "forrige avkorting",
                            dato,
                        })?;
                (ny.ytelse_etter_avkorting, forrige.ytelse_etter_avkorting)
            }
            None => (ny.utbetalt_beloep, forrige.utbetalt_beloep),
        };

        Ok(Self {
            forrige_ytelse,
            ny_ytelse,
            forrige_beregnet: forrige.utbetalt_beloep,
            ny_beregnet: ny.utbetalt_beloep,
            forrige_grunnbeloep: forrige.grunnbelop,
            ny_grunnbeloep: grunnbeloep.grunnbeloep,
        })
    }
}

/// Check hard limits, then the proportional model.
pub fn verifiser(grunnlag: &Toleransegrunnlag) -> Result<Vec<Advarsel>, ToleranseFeil> {
    let Toleransegrunnlag {
        forrige_ytelse: forrige,
        ny_ytelse: ny,
        ..
    } = *grunnlag;

    if ny < forrige {
        return Err(ToleranseFeil::MindreEnnForrigeBehandling { forrige, ny });
    }
    // Nothing to scale from when the previous benefit was fully reduced.
    if forrige > 0 && over_maks_oekning(forrige, ny) {
        return Err(ToleranseFeil::ForStorOekning { forrige, ny });
    }

    let mut advarsler = Vec::new();
    if let Some(forventet) = forventet_beloep(
        grunnlag.forrige_beregnet,
        grunnlag.forrige_grunnbeloep,
        grunnlag.ny_grunnbeloep,
    ) {
        let differanse = (i128::from(grunnlag.ny_beregnet) - i128::from(forventet)).abs();
        if differanse > i128::from(AVRUNDINGSTOLERANSE) {
            let differanse = i64::try_from(differanse).unwrap_or(i64::MAX);
            advarsler.push(Advarsel {
                kode: "AvvikFraForventetRegulering".to_string(),
                forventet,
                faktisk: grunnlag.ny_beregnet,
                differanse,
            });
        }
    }
    Ok(advarsler)
}

fn over_maks_oekning(forrige: i64, ny: i64) -> bool {
    let (teller, nevner) = MAKS_OEKNING;
    i128::from(ny) * i128::from(nevner) > i128::from(forrige) * i128::from(teller)
}

/// `forrige × ny_g / forrige_g`, rounded half up to whole units.
///
/// `None` when the previous grunnbeløp is not positive.
pub fn forventet_beloep(forrige: i64, forrige_g: i64, ny_g: i64) -> Option<i64> {
    if forrige_g <= 0 {
        return None;
    }
    let teller = i128::from(forrige) * i128::from(ny_g);
    let nevner = i128::from(forrige_g);
    // floor((2t + n) / 2n) rounds half up, also for negative products.
    let avrundet = (2 * teller + nevner).div_euclid(2 * nevner);
    i64::try_from(avrundet).ok()
}
