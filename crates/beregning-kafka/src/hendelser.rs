//! Event names and message keys of the recalculation saga.
//!
//! Two namespaces run the same stages: `REGULERING` for the yearly base-rate
//! regulation and `OMREGNING` for migration and manual triggers. A river keeps
//! the namespace of the message it received when it advances it.

use std::fmt;
use std::str::FromStr;

pub const HENDELSE_DATA_KEY: &str = "hendelse_data";
pub const KJOERING: &str = "hendelse_data.kjoering";
pub const SAK_ID: &str = "hendelse_data.sakId";
pub const SAK_TYPE: &str = "hendelse_data.sakType";
pub const REVURDERINGAARSAK: &str = "hendelse_data.revurderingaarsak";
pub const FRADATO: &str = "hendelse_data.fradato";
pub const BEHANDLING_ID: &str = "hendelse_data.behandlingId";
pub const FORRIGE_BEHANDLING_ID: &str = "hendelse_data.forrigeBehandlingId";

/// Open behandlinger in the sak, supplied by whoever found the sak.
pub const AAPNE_BEHANDLINGER_KEY: &str = "aapne_behandlinger";

// One output key per stage. Each stage rejects its own.
pub const OVERSTYRT_KONTROLLERT_KEY: &str = "overstyrt_beregning_kontrollert";
pub const TRYGDETID_KOPIERT_KEY: &str = "trygdetid_kopiert";
pub const BEREGNING_KEY: &str = "beregning";
pub const AVKORTING_KEY: &str = "avkorting";
pub const TOLERANSE_KEY: &str = "toleranse";
pub const KLAR_FOR_VEDTAK_KEY: &str = "klar_for_vedtak";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Regulering,
    Omregning,
}

impl Namespace {
    pub const ALLE: [Namespace; 2] = [Namespace::Regulering, Namespace::Omregning];

    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Regulering => "REGULERING",
            Namespace::Omregning => "OMREGNING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Steg {
    LoependeYtelseFunnet,
    KlarForOmregning,
    BehandlingOpprettet,
    TrygdetidKopiert,
    Vilkaarsvurdert,
    Beregnet,
    Avkortet,
    Verifisert,
    KlarForVedtak,
}

impl Steg {
    const ALLE: [Steg; 9] = [
        Steg::LoependeYtelseFunnet,
        Steg::KlarForOmregning,
        Steg::BehandlingOpprettet,
        Steg::TrygdetidKopiert,
        Steg::Vilkaarsvurdert,
        Steg::Beregnet,
        Steg::Avkortet,
        Steg::Verifisert,
        Steg::KlarForVedtak,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Steg::LoependeYtelseFunnet => "LOEPENDE_YTELSE_FUNNET",
            Steg::KlarForOmregning => "KLAR_FOR_OMREGNING",
            Steg::BehandlingOpprettet => "BEHANDLING_OPPRETTA",
            Steg::TrygdetidKopiert => "TRYGDETID_KOPIERT",
            Steg::Vilkaarsvurdert => "VILKAARSVURDERT",
            Steg::Beregnet => "BEREGNA",
            Steg::Avkortet => "AVKORTA",
            Steg::Verifisert => "VERIFISERT",
            Steg::KlarForVedtak => "KLAR_FOR_VEDTAK",
        }
    }

    /// The event name of this stage in every namespace.
    pub fn i_alle_namespaces(self) -> Vec<String> {
        Namespace::ALLE
            .iter()
            .map(|namespace| Hendelse::new(*namespace, self).to_string())
            .collect()
    }
}

/// A parsed event name, `NAMESPACE:STEG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hendelse {
    pub namespace: Namespace,
    pub steg: Steg,
}

impl Hendelse {
    pub fn new(namespace: Namespace, steg: Steg) -> Self {
        Self { namespace, steg }
    }

    /// Same namespace, next stage.
    pub fn neste(self, steg: Steg) -> Self {
        Self::new(self.namespace, steg)
    }
}

impl fmt::Display for Hendelse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace.as_str(), self.steg.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("ukjent hendelse `{0}`")]
pub struct UkjentHendelse(pub String);

impl FromStr for Hendelse {
    type Err = UkjentHendelse;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ukjent = || UkjentHendelse(s.to_string());
        let (namespace, steg) = s.split_once(':').ok_or_else(ukjent)?;
        let namespace = Namespace::ALLE
            .into_iter()
            .find(|candidate| candidate.as_str() == namespace)
            .ok_or_else(ukjent)?;
        let steg = Steg::ALLE
            .into_iter()
            .find(|candidate| candidate.as_str() == steg)
            .ok_or_else(ukjent)?;
        Ok(Hendelse::new(namespace, steg))
    }
}
