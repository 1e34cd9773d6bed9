#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use beregning_kafka::domene::{
    AvkortetYtelse, AvkortingDto, BeregningDto, Beregningsperiode, Grunnbeloep, OverstyrtBeregning,
};
use beregning_kafka::klient::{AvkortingService, BeregningService, KlientError, TrygdetidService};
use beregning_kafka::{registrer, Tjenester};
use chrono::NaiveDate;
use elv::RapidsBuilder;
use elv_testing::TestRapid;
use serde_json::{json, Value};
use uuid::Uuid;

pub const G_2025: i64 = 130_160;
pub const G_2026: i64 = 136_000;

pub fn ny_behandling() -> Uuid {
    Uuid::parse_str("0b8b9f3c-1f1e-4b0a-8a57-0c3d9c1f9e21").unwrap()
}

pub fn forrige_behandling() -> Uuid {
    Uuid::parse_str("8c0b0c3f-8a3c-4a7e-9a59-4f1b6f1f2f10").unwrap()
}

pub fn fradato() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, 1).unwrap()
}

/// A saga message with `hendelse_data` filled in for both behandlinger.
pub fn melding(event_name: &str, sak_type: &str, revurderingaarsak: &str) -> Value {
    json!({
        "@event_name": event_name,
        "@correlation_id": "korrelasjon-1",
        "hendelse_data": {
            "kjoering": "Regulering-2026",
            "sakId": 42,
            "sakType": sak_type,
            "revurderingaarsak": revurderingaarsak,
            "fradato": "2026-05-01",
            "behandlingId": ny_behandling(),
            "forrigeBehandlingId": forrige_behandling(),
        }
    })
}

pub fn med(mut melding: Value, key: &str, value: Value) -> Value {
    melding[key] = value;
    melding
}

fn periode(fom: NaiveDate, beloep: i64, grunnbeloep: i64) -> Beregningsperiode {
    Beregningsperiode {
        dato_fom: fom,
        dato_tom: None,
        utbetalt_beloep: beloep,
        grunnbelop: grunnbeloep,
        grunnbelop_mnd: grunnbeloep / 12,
        trygdetid: Some(40),
    }
}

pub fn beregning(behandling_id: Uuid, fom: NaiveDate, beloep: i64, grunnbeloep: i64) -> BeregningDto {
    BeregningDto {
        beregning_id: Uuid::new_v4(),
        behandling_id,
        beregningstype: "BP".to_string(),
        beregnet_dato: None,
        beregningsperioder: vec![periode(fom, beloep, grunnbeloep)],
    }
}

pub fn avkorting(fom: NaiveDate, foer: i64, etter: i64) -> AvkortingDto {
    AvkortingDto {
        avkortet_ytelse: vec![AvkortetYtelse {
            fom,
            tom: None,
            ytelse_foer_avkorting: foer,
            avkortingsbeloep: foer - etter,
            ytelse_etter_avkorting: etter,
        }],
    }
}

pub fn serverfeil_oppbrukt() -> KlientError {
    KlientError::ForsoekOppbrukt {
        forsoek: 4,
        siste: Box::new(KlientError::Serverfeil {
            url: "http://beregning/api/beregning".to_string(),
            status: 503,
        }),
    }
}

/// Records every call; answers from configurable state.
pub struct MockBeregning {
    pub kall: Mutex<Vec<String>>,
    pub ny: Mutex<BeregningDto>,
    pub forrige: Mutex<Option<BeregningDto>>,
    pub overstyrt: Mutex<HashMap<Uuid, OverstyrtBeregning>>,
    pub grunnbeloep: Mutex<i64>,
    pub beregn_feiler: Mutex<bool>,
}

impl MockBeregning {
    /// Previous benefit `forrige` at `forrige_g`, regulated to `ny` at `ny_g`.
    pub fn new(forrige: i64, forrige_g: i64, ny: i64, ny_g: i64) -> Self {
        let forrige_fom = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        Self {
            kall: Mutex::new(Vec::new()),
            ny: Mutex::new(beregning(ny_behandling(), fradato(), ny, ny_g)),
            forrige: Mutex::new(Some(beregning(forrige_behandling(), forrige_fom, forrige, forrige_g))),
            overstyrt: Mutex::new(HashMap::new()),
            grunnbeloep: Mutex::new(ny_g),
            beregn_feiler: Mutex::new(false),
        }
    }

    pub fn kall(&self) -> Vec<String> {
        self.kall.lock().unwrap().clone()
    }

    fn logg(&self, kall: impl Into<String>) {
        self.kall.lock().unwrap().push(kall.into());
    }
}

#[async_trait]
impl BeregningService for MockBeregning {
    async fn opprett_beregningsgrunnlag_fra_forrige(&self, _: Uuid, _: Uuid) -> Result<(), KlientError> {
        self.logg("opprett_beregningsgrunnlag");
        Ok(())
    }

    async fn tilpass_overstyrt_beregningsgrunnlag_regulering(&self, _: Uuid) -> Result<(), KlientError> {
        self.logg("tilpass_overstyrt_regulering");
        Ok(())
    }

    async fn beregn(&self, _: Uuid) -> Result<BeregningDto, KlientError> {
        self.logg("beregn");
        if *self.beregn_feiler.lock().unwrap() {
            return Err(serverfeil_oppbrukt());
        }
        Ok(self.ny.lock().unwrap().clone())
    }

    async fn hent_beregning(&self, _: Uuid) -> Result<Option<BeregningDto>, KlientError> {
        self.logg("hent_beregning");
        Ok(self.forrige.lock().unwrap().clone())
    }

    async fn hent_overstyrt_beregning(&self, behandling_id: Uuid) -> Result<OverstyrtBeregning, KlientError> {
        self.logg("hent_overstyrt_beregning");
        Ok(self
            .overstyrt
            .lock()
            .unwrap()
            .get(&behandling_id)
            .copied()
            .unwrap_or(OverstyrtBeregning::Ingen))
    }

    async fn hent_grunnbeloep(&self, dato: NaiveDate) -> Result<Grunnbeloep, KlientError> {
        self.logg("hent_grunnbeloep");
        let grunnbeloep = *self.grunnbeloep.lock().unwrap();
        Ok(Grunnbeloep {
            dato,
            grunnbeloep,
            grunnbeloep_per_maaned: grunnbeloep / 12,
        })
    }
}

pub struct MockAvkorting {
    pub kall: Mutex<Vec<String>>,
    pub ny: Mutex<AvkortingDto>,
    pub forrige: Mutex<Option<AvkortingDto>>,
}

impl MockAvkorting {
    pub fn new(forrige_etter: i64, ny_etter: i64) -> Self {
        let forrige_fom = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        Self {
            kall: Mutex::new(Vec::new()),
            ny: Mutex::new(avkorting(fradato(), ny_etter + 500, ny_etter)),
            forrige: Mutex::new(Some(avkorting(forrige_fom, forrige_etter + 500, forrige_etter))),
        }
    }

    pub fn kall(&self) -> Vec<String> {
        self.kall.lock().unwrap().clone()
    }
}

#[async_trait]
impl AvkortingService for MockAvkorting {
    async fn omregn_avkorting(&self, _: Uuid, _: Uuid) -> Result<AvkortingDto, KlientError> {
        self.kall.lock().unwrap().push("omregn_avkorting".into());
        Ok(self.ny.lock().unwrap().clone())
    }

    async fn aarlig_inntektsjustering(&self, _: Uuid, _: Uuid) -> Result<AvkortingDto, KlientError> {
        self.kall.lock().unwrap().push("aarlig_inntektsjustering".into());
        Ok(self.ny.lock().unwrap().clone())
    }

    async fn hent_avkorting(&self, _: Uuid) -> Result<Option<AvkortingDto>, KlientError> {
        self.kall.lock().unwrap().push("hent_avkorting".into());
        Ok(self.forrige.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct MockTrygdetid {
    pub kopieringer: Mutex<Vec<(Uuid, Uuid)>>,
}

impl MockTrygdetid {
    pub fn antall(&self) -> usize {
        self.kopieringer.lock().unwrap().len()
    }
}

#[async_trait]
impl TrygdetidService for MockTrygdetid {
    async fn kopier_trygdetid(&self, behandling_id: Uuid, forrige: Uuid) -> Result<(), KlientError> {
        self.kopieringer.lock().unwrap().push((behandling_id, forrige));
        Ok(())
    }
}

pub struct Oppsett {
    pub beregning: Arc<MockBeregning>,
    pub avkorting: Arc<MockAvkorting>,
    pub trygdetid: Arc<MockTrygdetid>,
    pub rapid: TestRapid,
}

impl Oppsett {
    pub fn new(beregning: MockBeregning, avkorting: MockAvkorting) -> Self {
        let beregning = Arc::new(beregning);
        let avkorting = Arc::new(avkorting);
        let trygdetid = Arc::new(MockTrygdetid::default());
        let tjenester = Tjenester {
            beregning: beregning.clone(),
            avkorting: avkorting.clone(),
            trygdetid: trygdetid.clone(),
        };
        Self {
            rapid: TestRapid::new(registrer(RapidsBuilder::new(), &tjenester)),
            beregning,
            avkorting,
            trygdetid,
        }
    }

    /// Flat benefit of 3000 before and after, at an unchanged grunnbeløp.
    pub fn uendret() -> Self {
        Self::new(MockBeregning::new(3000, G_2025, 3000, G_2025), MockAvkorting::new(3000, 3000))
    }
}
