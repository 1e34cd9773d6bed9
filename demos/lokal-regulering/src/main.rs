//! # Local regulation run
//!
//! Runs four saker through the whole saga on an in-memory bus, with stub
//! services standing in for beregning, avkorting and trygdetid, and a small
//! river standing in for the behandling service.
//!
//! - sak 1, barnepensjon: regulated along with the grunnbeløp
//! - sak 2, barnepensjon: the new beregning is one krone lower, stopped
//! - sak 3, omstillingsstønad: goes through avkorting
//! - sak 4: has an open behandling with an overridden beregning, blocked
//!
//! `RUST_LOG=debug cargo run -p lokal-regulering` shows every stage.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use beregning_kafka::domene::{
    AvkortetYtelse, AvkortingDto, BeregningDto, Beregningsperiode, Grunnbeloep, OverstyrtBeregning,
};
use beregning_kafka::hendelser::{Hendelse, Steg, UkjentHendelse};
use beregning_kafka::klient::{AvkortingService, BeregningService, KlientError, TrygdetidService};
use beregning_kafka::{registrer, Tjenester};
use chrono::NaiveDate;
use elv::{
    InMemoryBus, MessageContext, Outcome, Packet, Precondition, RapidsBuilder, River, RiverError,
    Subscription, FAILURE_EVENT_NAME,
};
use serde_json::json;
use uuid::Uuid;

const G_2025: i64 = 130_160;
const G_2026: i64 = 136_000;

// ============================================================================
// Stub services
// ============================================================================

/// Monthly amounts per behandling: (amount, grunnbeløp it was computed with).
struct StubBeregning {
    beloep: HashMap<Uuid, (i64, i64)>,
    overstyrt: HashSet<Uuid>,
}

fn fom(behandling_g: i64) -> NaiveDate {
    if behandling_g == G_2026 {
        NaiveDate::from_ymd_opt(2026, 5, 1).unwrap_or_default()
    } else {
        NaiveDate::from_ymd_opt(2025, 5, 1).unwrap_or_default()
    }
}

impl StubBeregning {
    fn beregning(&self, behandling_id: Uuid) -> Option<BeregningDto> {
        let (beloep, grunnbeloep) = *self.beloep.get(&behandling_id)?;
        Some(BeregningDto {
            beregning_id: Uuid::new_v4(),
            behandling_id,
            beregningstype: "BP".to_string(),
            beregnet_dato: None,
            beregningsperioder: vec![Beregningsperiode {
                dato_fom: fom(grunnbeloep),
                dato_tom: None,
                utbetalt_beloep: beloep,
                grunnbelop: grunnbeloep,
                grunnbelop_mnd: grunnbeloep / 12,
                trygdetid: Some(40),
            }],
        })
    }
}

#[async_trait]
impl BeregningService for StubBeregning {
    async fn opprett_beregningsgrunnlag_fra_forrige(&self, _: Uuid, _: Uuid) -> Result<(), KlientError> {
        Ok(())
    }

    async fn tilpass_overstyrt_beregningsgrunnlag_regulering(&self, _: Uuid) -> Result<(), KlientError> {
        Ok(())
    }

    async fn beregn(&self, behandling_id: Uuid) -> Result<BeregningDto, KlientError> {
        self.beregning(behandling_id).ok_or(KlientError::ManglerBody {
            url: format!("stub://beregning/{behandling_id}"),
        })
    }

    async fn hent_beregning(&self, behandling_id: Uuid) -> Result<Option<BeregningDto>, KlientError> {
        Ok(self.beregning(behandling_id))
    }

    async fn hent_overstyrt_beregning(&self, behandling_id: Uuid) -> Result<OverstyrtBeregning, KlientError> {
        Ok(if self.overstyrt.contains(&behandling_id) {
            OverstyrtBeregning::Finnes
        } else {
            OverstyrtBeregning::Ingen
        })
    }

    async fn hent_grunnbeloep(&self, dato: NaiveDate) -> Result<Grunnbeloep, KlientError> {
        Ok(Grunnbeloep {
            dato,
            grunnbeloep: G_2026,
            grunnbeloep_per_maaned: G_2026 / 12,
        })
    }
}

/// Flat 800 kr income reduction on top of whatever was computed.
struct StubAvkorting {
    beregning: Arc<StubBeregning>,
}

impl StubAvkorting {
    fn avkorting(&self, behandling_id: Uuid) -> Option<AvkortingDto> {
        let (beloep, grunnbeloep) = *self.beregning.beloep.get(&behandling_id)?;
        Some(AvkortingDto {
            avkortet_ytelse: vec![AvkortetYtelse {
                fom: fom(grunnbeloep),
                tom: None,
                ytelse_foer_avkorting: beloep,
                avkortingsbeloep: 800,
                ytelse_etter_avkorting: beloep - 800,
            }],
        })
    }
}

#[async_trait]
impl AvkortingService for StubAvkorting {
    async fn omregn_avkorting(&self, behandling_id: Uuid, _: Uuid) -> Result<AvkortingDto, KlientError> {
        self.avkorting(behandling_id).ok_or(KlientError::ManglerBody {
            url: format!("stub://avkorting/{behandling_id}"),
        })
    }

    async fn aarlig_inntektsjustering(&self, behandling_id: Uuid, forrige: Uuid) -> Result<AvkortingDto, KlientError> {
        self.omregn_avkorting(behandling_id, forrige).await
    }

    async fn hent_avkorting(&self, behandling_id: Uuid) -> Result<Option<AvkortingDto>, KlientError> {
        Ok(self.avkorting(behandling_id))
    }
}

struct StubTrygdetid;

#[async_trait]
impl TrygdetidService for StubTrygdetid {
    async fn kopier_trygdetid(&self, _: Uuid, _: Uuid) -> Result<(), KlientError> {
        Ok(())
    }
}

// ============================================================================
// Behandling service stand-in
// ============================================================================

/// Moves a message across the stages the behandling service owns.
struct Behandling {
    fra: Steg,
    til: Steg,
    key: &'static str,
}

#[async_trait]
impl River for Behandling {
    fn name(&self) -> &'static str {
        self.key
    }

    fn preconditions(&self) -> Vec<Precondition> {
        vec![Precondition::events(self.fra.i_alle_namespaces()).reject_key(self.key)]
    }

    async fn handle(&self, mut packet: Packet, _: &MessageContext) -> Result<Outcome, RiverError> {
        let hendelse: Hendelse = packet
            .event_name()
            .unwrap_or_default()
            .parse()
            .map_err(|e: UkjentHendelse| {
                RiverError::data_integrity("UkjentHendelse", e.to_string())
            })?;
        packet.set(self.key, true)?;
        packet.advance(hendelse.neste(self.til).to_string());
        Ok(Outcome::Publish(packet))
    }
}

// ============================================================================
// Main
// ============================================================================

struct Sak {
    sak_id: i64,
    sak_type: &'static str,
    forrige: i64,
    ny: i64,
    overstyrt: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let saker = [
        Sak { sak_id: 1, sak_type: "BARNEPENSJON", forrige: 3000, ny: 3135, overstyrt: false },
        Sak { sak_id: 2, sak_type: "BARNEPENSJON", forrige: 3000, ny: 2999, overstyrt: false },
        Sak { sak_id: 3, sak_type: "OMSTILLINGSSTOENAD", forrige: 12_000, ny: 12_538, overstyrt: false },
        Sak { sak_id: 4, sak_type: "BARNEPENSJON", forrige: 3000, ny: 3135, overstyrt: true },
    ];

    let mut beloep = HashMap::new();
    let mut overstyrt = HashSet::new();
    let mut meldinger = Vec::new();
    for sak in &saker {
        let forrige_id = Uuid::new_v4();
        let ny_id = Uuid::new_v4();
        beloep.insert(forrige_id, (sak.forrige, G_2025));
        beloep.insert(ny_id, (sak.ny, G_2026));
        let aapne = if sak.overstyrt {
            let aapen = Uuid::new_v4();
            overstyrt.insert(aapen);
            vec![aapen]
        } else {
            Vec::new()
        };
        meldinger.push(json!({
            "@event_name": "REGULERING:LOEPENDE_YTELSE_FUNNET",
            "@correlation_id": Uuid::new_v4(),
            "hendelse_data": {
                "kjoering": "Regulering-2026",
                "sakId": sak.sak_id,
                "sakType": sak.sak_type,
                "revurderingaarsak": "REGULERING",
                "fradato": "2026-05-01",
                "behandlingId": ny_id,
                "forrigeBehandlingId": forrige_id,
            },
            "aapne_behandlinger": aapne,
        }));
    }

    let beregning = Arc::new(StubBeregning { beloep, overstyrt });
    let tjenester = Tjenester {
        beregning: beregning.clone(),
        avkorting: Arc::new(StubAvkorting { beregning }),
        trygdetid: Arc::new(StubTrygdetid),
    };

    let bus = Arc::new(InMemoryBus::new());
    let rapids = registrer(RapidsBuilder::new(), &tjenester)
        .with_river(Behandling {
            fra: Steg::KlarForOmregning,
            til: Steg::BehandlingOpprettet,
            key: "behandling_opprettet",
        })
        .with_river(Behandling {
            fra: Steg::TrygdetidKopiert,
            til: Steg::Vilkaarsvurdert,
            key: "vilkaarsvurdert",
        })
        .build(Arc::clone(&bus));

    let mut observer = bus.subscribe();
    let subscription = bus.subscribe();
    let ferdig = async move {
        let mut avsluttet = 0;
        while avsluttet < saker.len() {
            let Some(raw) = observer.next_message().await else {
                break;
            };
            let Ok(packet) = Packet::from_json(&raw) else {
                continue;
            };
            let event_name = packet.event_name().unwrap_or_default();
            let sak_id = packet.get("hendelse_data.sakId").cloned().unwrap_or_default();
            println!("sak {sak_id:>2}  {event_name}");
            if event_name == FAILURE_EVENT_NAME {
                println!("        feil: {}", packet.get("feil.kode").cloned().unwrap_or_default());
                avsluttet += 1;
            } else if event_name.ends_with(Steg::KlarForVedtak.as_str()) {
                avsluttet += 1;
            }
        }
    };

    for melding in &meldinger {
        bus.send_raw(melding.to_string());
    }
    rapids.run_until(subscription, ferdig).await?;

    println!("All saker handled!");
    Ok(())
}
