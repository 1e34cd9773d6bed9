//! Configuration of the `beregning-kafka` binary.
//!
//! Read from a TOML file (path in `BEREGNING_KAFKA_CONFIG`, default
//! `beregning-kafka.toml`; a missing default file is fine), then overridden
//! from the environment. Every field has a default except the token.
//!
//! ```toml
//! beregning_url = "http://etterlatte-beregning"
//! trygdetid_url = "http://etterlatte-trygdetid"
//! timeout_secs = 10
//! tung_timeout_secs = 30
//!
//! [retry]
//! max_attempts = 4
//!
//! [rapids]
//! max_in_flight = 16
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use elv::RapidsConfig;
use serde::{Deserialize, Serialize};

use crate::klient::RetryPolicy;

pub const CONFIG_PATH_ENV: &str = "BEREGNING_KAFKA_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "beregning-kafka.toml";

pub const BEREGNING_URL_ENV: &str = "BEREGNING_URL";
pub const TRYGDETID_URL_ENV: &str = "TRYGDETID_URL";
pub const TOKEN_ENV: &str = "BEREGNING_KAFKA_TOKEN";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("kunne ikke lese konfigurasjon {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ugyldig konfigurasjon")]
    Parse(#[from] toml::de::Error),

    #[error("ugyldig konfigurasjon: {0}")]
    Validation(String),
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub beregning_url: String,
    pub trygdetid_url: String,
    /// Bearer token for the domain services. Usually only set through the environment.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub timeout_secs: u64,
    /// Timeout for recomputing beregning and avkorting.
    pub tung_timeout_secs: u64,
    pub retry: RetryPolicy,
    pub rapids: RapidsInnstillinger,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            beregning_url: "http://etterlatte-beregning".to_string(),
            trygdetid_url: "http://etterlatte-trygdetid".to_string(),
            token: None,
            timeout_secs: 10,
            tung_timeout_secs: 30,
            retry: RetryPolicy::default(),
            rapids: RapidsInnstillinger::default(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("beregning_url", &self.beregning_url)
            .field("trygdetid_url", &self.trygdetid_url)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("timeout_secs", &self.timeout_secs)
            .field("tung_timeout_secs", &self.tung_timeout_secs)
            .field("retry", &self.retry)
            .field("rapids", &self.rapids)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RapidsInnstillinger {
    pub max_in_flight: usize,
    pub publish_failures: bool,
}

impl Default for RapidsInnstillinger {
    fn default() -> Self {
        let defaults = RapidsConfig::default();
        Self {
            max_in_flight: defaults.max_in_flight,
            publish_failures: defaults.publish_failures,
        }
    }
}

impl From<&RapidsInnstillinger> for RapidsConfig {
    fn from(innstillinger: &RapidsInnstillinger) -> Self {
        RapidsConfig {
            max_in_flight: innstillinger.max_in_flight,
            publish_failures: innstillinger.publish_failures,
        }
    }
}

impl Config {
    /// File and environment, as the binary sees them.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.with_overrides(|key| std::env::var(key).ok()).validated()
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from `lookup`, normally the process environment.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(BEREGNING_URL_ENV) {
            self.beregning_url = url;
        }
        if let Some(url) = lookup(TRYGDETID_URL_ENV) {
            self.trygdetid_url = url;
        }
        if let Some(token) = lookup(TOKEN_ENV) {
            self.token = Some(token);
        }
        self
    }

    pub fn validated(self) -> Result<Self, ConfigError> {
        for (navn, url) in [
            ("beregning_url", &self.beregning_url),
            ("trygdetid_url", &self.trygdetid_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Validation(format!(
                    "{navn} må være en http(s)-url, var `{url}`"
                )));
            }
        }
        if self.token.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::Validation(format!("token mangler; sett {TOKEN_ENV}")));
        }
        if self.timeout_secs == 0 || self.tung_timeout_secs == 0 {
            return Err(ConfigError::Validation("timeout må være større enn 0".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Validation("retry.max_attempts må være minst 1".to_string()));
        }
        if self.rapids.max_in_flight == 0 {
            return Err(ConfigError::Validation("rapids.max_in_flight må være minst 1".to_string()));
        }
        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn tung_timeout(&self) -> Duration {
        Duration::from_secs(self.tung_timeout_secs)
    }

    pub fn rapids_config(&self) -> RapidsConfig {
        RapidsConfig::from(&self.rapids)
    }
}
