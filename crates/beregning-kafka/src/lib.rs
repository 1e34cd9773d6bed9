//! Stage rivers for recalculating ongoing benefits.
//!
//! A regulation or migration run publishes one message per sak. The rivers in
//! [`rivers`] move each message through the saga
//!
//! ```text
//! LOEPENDE_YTELSE_FUNNET → KLAR_FOR_OMREGNING → BEHANDLING_OPPRETTA → TRYGDETID_KOPIERT
//!   → VILKAARSVURDERT → BEREGNA → [AVKORTA] → VERIFISERT → KLAR_FOR_VEDTAK
//! ```
//!
//! calling the beregning, avkorting and trygdetid services through
//! [`klient`]. The stages between `KLAR_FOR_OMREGNING` and `VILKAARSVURDERT`
//! belong to the behandling service and are only observed here.
//!
//! ```rust,ignore
//! use beregning_kafka::rivers::{self, Tjenester};
//!
//! let rapids = rivers::registrer(RapidsBuilder::new(), &tjenester).build(bus);
//! rapids.run_until(subscription, shutdown).await?;
//! ```

pub mod config;
pub mod domene;
pub mod hendelser;
pub mod klient;
pub mod rivers;
pub mod toleranse;

pub use config::{Config, ConfigError};
pub use rivers::{registrer, Tjenester};
