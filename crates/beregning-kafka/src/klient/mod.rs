//! Thin synchronous RPC wrappers around the domain services.
//!
//! Every call goes through [`HttpKlient`], which owns the uniform policy:
//!
//! - 2xx: the DTO (a missing body where one is required is [`KlientError::ManglerBody`])
//! - 4xx: [`KlientError::Avvist`], the service said no, never retried
//! - 5xx, 408, 429, connect errors and timeouts: transient, retried by [`RetryPolicy`]
//! - a request that cannot be built or a body that cannot be read: [`KlientError::UgyldigForespoersel`], never retried
//!
//! The correlation id of the message being handled is forwarded on every
//! request so the services' logs line up with ours.

mod avkorting;
mod beregning;
mod retry;
#[cfg(test)]
mod stub;
mod trygdetid;

pub use avkorting::{AvkortingKlient, AvkortingService};
pub use beregning::{BeregningKlient, BeregningService};
pub use retry::RetryPolicy;
pub use trygdetid::{TrygdetidKlient, TrygdetidService};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use elv::{Categorizable, ErrorKind, RiverError};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

pub const CALL_ID_HEADER: &str = "Nav-Call-Id";
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

#[derive(Debug, thiserror::Error)]
pub enum KlientError {
    #[error("kall mot {url} feilet")]
    Nettverk {
        url: String,
        #[source]
        kilde: reqwest::Error,
    },

    /// The request could not be built or the response not read as sent.
    #[error("ugyldig kall mot {url}")]
    UgyldigForespoersel {
        url: String,
        #[source]
        kilde: reqwest::Error,
    },

    #[error("{url} svarte {status}")]
    Serverfeil { url: String, status: u16 },

    #[error("{url} avviste kallet med {status}: {body}")]
    Avvist { url: String, status: u16, body: String },

    #[error("{url} svarte uten innhold der innhold var forventet")]
    ManglerBody { url: String },

    #[error("kunne ikke tolke svar fra {url}")]
    UgyldigSvar {
        url: String,
        #[source]
        kilde: serde_json::Error,
    },

    #[error("kunne ikke hente token: {0}")]
    Token(String),

    #[error("ga opp etter {forsoek} forsøk: {siste}")]
    ForsoekOppbrukt {
        forsoek: u32,
        #[source]
        siste: Box<KlientError>,
    },
}

impl Categorizable for KlientError {
    fn kind(&self) -> ErrorKind {
        match self {
            KlientError::Nettverk { .. } | KlientError::Serverfeil { .. } | KlientError::Token(_) => {
                ErrorKind::Transient
            }
            KlientError::UgyldigForespoersel { .. }
            | KlientError::Avvist { .. }
            | KlientError::ManglerBody { .. }
            | KlientError::UgyldigSvar { .. } => ErrorKind::DataIntegrity,
            KlientError::ForsoekOppbrukt { .. } => ErrorKind::RetriesExhausted,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            KlientError::Nettverk { .. } => "Nettverksfeil",
            KlientError::UgyldigForespoersel { .. } => "UgyldigForespoersel",
            KlientError::Serverfeil { .. } => "Serverfeil",
            KlientError::Avvist { .. } => "KallAvvist",
            KlientError::ManglerBody { .. } => "ManglerInnhold",
            KlientError::UgyldigSvar { .. } => "UgyldigSvar",
            KlientError::Token(_) => "TokenFeil",
            KlientError::ForsoekOppbrukt { .. } => "ForsoekOppbrukt",
        }
    }
}

impl From<KlientError> for RiverError {
    fn from(feil: KlientError) -> Self {
        RiverError::categorized(feil)
    }
}

/// Statuses worth another attempt.
pub fn er_forbigaaende(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// Builder and decode errors will fail the same way on every attempt.
fn fra_reqwest(url: &str, kilde: reqwest::Error) -> KlientError {
    let url = url.to_string();
    if kilde.is_builder() || kilde.is_decode() {
        KlientError::UgyldigForespoersel { url, kilde }
    } else {
        KlientError::Nettverk { url, kilde }
    }
}

/// Source of the bearer token sent with every call.
#[async_trait]
pub trait TokenKilde: Send + Sync {
    async fn token(&self) -> Result<String, KlientError>;
}

/// A fixed token, e.g. injected by the platform at startup.
#[derive(Clone)]
pub struct StatiskToken(String);

impl StatiskToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StatiskToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StatiskToken(***)")
    }
}

#[async_trait]
impl TokenKilde for StatiskToken {
    async fn token(&self) -> Result<String, KlientError> {
        Ok(self.0.clone())
    }
}

/// A response that was not a transient failure.
#[derive(Debug, Clone)]
pub struct Svar {
    pub url: String,
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl Svar {
    /// 2xx or an error describing why not.
    pub fn krev_suksess(self) -> Result<Self, KlientError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(KlientError::Avvist {
                body: String::from_utf8_lossy(&self.body).into_owned(),
                url: self.url,
                status: self.status.as_u16(),
            })
        }
    }

    pub fn har_innhold(&self) -> bool {
        self.status != StatusCode::NO_CONTENT && !self.body.iter().all(u8::is_ascii_whitespace)
    }

    pub fn json<T: DeserializeOwned>(self) -> Result<T, KlientError> {
        if !self.har_innhold() {
            return Err(KlientError::ManglerBody { url: self.url });
        }
        serde_json::from_slice(&self.body).map_err(|kilde| KlientError::UgyldigSvar {
            url: self.url,
            kilde,
        })
    }

    /// `None` for 204 or an empty body.
    pub fn valgfri_json<T: DeserializeOwned>(self) -> Result<Option<T>, KlientError> {
        if !self.har_innhold() {
            return Ok(None);
        }
        self.json().map(Some)
    }
}

/// Shared HTTP plumbing for one service.
#[derive(Clone)]
pub struct HttpKlient {
    http: reqwest::Client,
    base_url: String,
    token: Arc<dyn TokenKilde>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl HttpKlient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        token: Arc<dyn TokenKilde>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            retry,
            timeout,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Call with the default timeout, retrying transient failures. Any
    /// non-transient status is returned for the caller to interpret.
    pub async fn kall(&self, method: Method, path: &str) -> Result<Svar, KlientError> {
        self.kall_med_timeout(method, path, self.timeout).await
    }

    pub async fn kall_med_timeout(
        &self,
        method: Method,
        path: &str,
        timeout: Duration,
    ) -> Result<Svar, KlientError> {
        let operasjon = format!("{method} {path}");
        self.retry
            .utfoer(&operasjon, || self.forsoek(method.clone(), path, timeout))
            .await
    }

    async fn forsoek(&self, method: Method, path: &str, timeout: Duration) -> Result<Svar, KlientError> {
        let url = self.url(path);
        let token = self.token.token().await?;

        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(token)
            .timeout(timeout)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(correlation_id) = elv::context::current_correlation_id() {
            request = request
                .header(CALL_ID_HEADER, correlation_id.as_str())
                .header(CORRELATION_ID_HEADER, correlation_id.as_str());
        }

        let response = request.send().await.map_err(|kilde| fra_reqwest(&url, kilde))?;
        let status = response.status();
        debug!(%method, %url, status = status.as_u16(), "svar fra tjeneste");

        if er_forbigaaende(status) {
            return Err(KlientError::Serverfeil {
                url,
                status: status.as_u16(),
            });
        }
        let body = response
            .bytes()
            .await
            .map_err(|kilde| fra_reqwest(&url, kilde))?
            .to_vec();
        Ok(Svar { url, status, body })
    }
}
