//! Wire types exchanged with the domain services and carried in messages.
//!
//! Field names follow the services' JSON (camelCase, with a few historical
//! exceptions such as `datoFOM`).

use chrono::{DateTime, NaiveDate, Utc};
use elv::{Packet, PacketError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hendelser::{AVKORTING_KEY, BEREGNING_KEY, HENDELSE_DATA_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SakType {
    Barnepensjon,
    /// Income tested: the only sak type with avkorting.
    Omstillingsstoenad,
}

impl SakType {
    pub fn as_str(self) -> &'static str {
        match self {
            SakType::Barnepensjon => "BARNEPENSJON",
            SakType::Omstillingsstoenad => "OMSTILLINGSSTOENAD",
        }
    }

    pub fn har_avkorting(self) -> bool {
        matches!(self, SakType::Omstillingsstoenad)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Revurderingaarsak {
    Regulering,
    AarligInntektsjustering,
    Omregning,
    Migrering,
}

impl Revurderingaarsak {
    pub fn as_str(self) -> &'static str {
        match self {
            Revurderingaarsak::Regulering => "REGULERING",
            Revurderingaarsak::AarligInntektsjustering => "AARLIG_INNTEKTSJUSTERING",
            Revurderingaarsak::Omregning => "OMREGNING",
            Revurderingaarsak::Migrering => "MIGRERING",
        }
    }
}

/// The `hendelse_data` of every saga message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OmregningData {
    pub kjoering: String,
    pub sak_id: i64,
    pub sak_type: SakType,
    pub revurderingaarsak: Revurderingaarsak,
    pub fradato: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behandling_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forrige_behandling_id: Option<Uuid>,
}

impl OmregningData {
    pub fn fra_pakke(packet: &Packet) -> Result<Self, PacketError> {
        packet.field(HENDELSE_DATA_KEY)
    }

    pub fn behandling_id(&self) -> Result<Uuid, PacketError> {
        self.behandling_id
            .ok_or_else(|| PacketError::MissingKey(crate::hendelser::BEHANDLING_ID.to_string()))
    }

    pub fn forrige_behandling_id(&self) -> Result<Uuid, PacketError> {
        self.forrige_behandling_id.ok_or_else(|| {
            PacketError::MissingKey(crate::hendelser::FORRIGE_BEHANDLING_ID.to_string())
        })
    }
}

/// Something valid over a date range with an open end.
pub trait Periode {
    fn fom(&self) -> NaiveDate;
    fn tom(&self) -> Option<NaiveDate>;

    fn dekker(&self, dato: NaiveDate) -> bool {
        self.fom() <= dato && self.tom().map_or(true, |tom| dato <= tom)
    }
}

/// The period covering `dato`, or failing that the latest one starting
/// before it (a prior case may have ended before the regulation date).
pub fn periode_paa_eller_foer<P: Periode>(perioder: &[P], dato: NaiveDate) -> Option<&P> {
    perioder.iter().find(|periode| periode.dekker(dato)).or_else(|| {
        perioder
            .iter()
            .filter(|periode| periode.fom() <= dato)
            .max_by_key(|periode| periode.fom())
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeregningDto {
    pub beregning_id: Uuid,
    pub behandling_id: Uuid,
    #[serde(rename = "type")]
    pub beregningstype: String,
    #[serde(default)]
    pub beregnet_dato: Option<DateTime<Utc>>,
    pub beregningsperioder: Vec<Beregningsperiode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Beregningsperiode {
    #[serde(rename = "datoFOM")]
    pub dato_fom: NaiveDate,
    #[serde(rename = "datoTOM", default)]
    pub dato_tom: Option<NaiveDate>,
    pub utbetalt_beloep: i64,
    pub grunnbelop: i64,
    pub grunnbelop_mnd: i64,
    #[serde(default)]
    pub trygdetid: Option<i64>,
}

impl Periode for Beregningsperiode {
    fn fom(&self) -> NaiveDate {
        self.dato_fom
    }

    fn tom(&self) -> Option<NaiveDate> {
        self.dato_tom
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvkortingDto {
    pub avkortet_ytelse: Vec<AvkortetYtelse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvkortetYtelse {
    pub fom: NaiveDate,
    #[serde(default)]
    pub tom: Option<NaiveDate>,
    pub ytelse_foer_avkorting: i64,
    pub avkortingsbeloep: i64,
    pub ytelse_etter_avkorting: i64,
}

impl Periode for AvkortetYtelse {
    fn fom(&self) -> NaiveDate {
        self.fom
    }

    fn tom(&self) -> Option<NaiveDate> {
        self.tom
    }
}

/// Grunnbeløp in effect from `dato`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grunnbeloep {
    pub dato: NaiveDate,
    pub grunnbeloep: i64,
    pub grunnbeloep_per_maaned: i64,
}

/// Answer of the override lookup. The service signals "no override" with 204
/// and "override" with 200; anything else means we cannot tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverstyrtBeregning {
    Ingen,
    Finnes,
    Ukjent { status: u16 },
}

/// Content of the `beregning` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeregningResultat {
    pub beregning: BeregningDto,
    pub forrige_beregning: BeregningDto,
}

/// Content of the `avkorting` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvkortingResultat {
    pub avkorting: AvkortingDto,
    pub forrige_avkorting: AvkortingDto,
}

/// New and previous results side by side, for the tolerance check.
#[derive(Debug, Clone, PartialEq)]
pub struct BeregningOgAvkorting {
    pub beregning: BeregningDto,
    pub forrige_beregning: BeregningDto,
    pub avkorting: Option<AvkortingResultat>,
}

impl BeregningOgAvkorting {
    pub fn fra_pakke(packet: &Packet) -> Result<Self, PacketError> {
        let BeregningResultat {
            beregning,
            forrige_beregning,
        } = packet.field(BEREGNING_KEY)?;
        Ok(Self {
            beregning,
            forrige_beregning,
            avkorting: packet.optional_field(AVKORTING_KEY)?,
        })
    }
}
