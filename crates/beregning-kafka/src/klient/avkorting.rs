use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use uuid::Uuid;

use super::{HttpKlient, KlientError};
use crate::domene::AvkortingDto;

/// Calls against the avkorting part of the beregning service. Only
/// income-tested sak types have avkorting.
#[async_trait]
pub trait AvkortingService: Send + Sync {
    /// Recompute avkorting for the new behandling from the previous one.
    async fn omregn_avkorting(
        &self,
        behandling_id: Uuid,
        forrige_behandling_id: Uuid,
    ) -> Result<AvkortingDto, KlientError>;

    /// Same, but with next year's expected income as reported for the yearly adjustment.
    async fn aarlig_inntektsjustering(
        &self,
        behandling_id: Uuid,
        forrige_behandling_id: Uuid,
    ) -> Result<AvkortingDto, KlientError>;

    async fn hent_avkorting(&self, behandling_id: Uuid) -> Result<Option<AvkortingDto>, KlientError>;
}

pub struct AvkortingKlient {
    http: HttpKlient,
    tung_timeout: Duration,
}

impl AvkortingKlient {
    pub fn new(http: HttpKlient, tung_timeout: Duration) -> Self {
        Self { http, tung_timeout }
    }

    async fn post_avkorting(&self, path: &str) -> Result<AvkortingDto, KlientError> {
        self.http
            .kall_med_timeout(Method::POST, path, self.tung_timeout)
            .await?
            .krev_suksess()?
            .json()
    }
}

#[async_trait]
impl AvkortingService for AvkortingKlient {
    async fn omregn_avkorting(
        &self,
        behandling_id: Uuid,
        forrige_behandling_id: Uuid,
    ) -> Result<AvkortingDto, KlientError> {
        self.post_avkorting(&format!(
            "/api/beregning/avkorting/{behandling_id}/med/{forrige_behandling_id}"
        ))
        .await
    }

    async fn aarlig_inntektsjustering(
        &self,
        behandling_id: Uuid,
        forrige_behandling_id: Uuid,
    ) -> Result<AvkortingDto, KlientError> {
        self.post_avkorting(&format!(
            "/api/beregning/avkorting/{behandling_id}/med/{forrige_behandling_id}/aarlig-inntektsjustering"
        ))
        .await
    }

    async fn hent_avkorting(&self, behandling_id: Uuid) -> Result<Option<AvkortingDto>, KlientError> {
        let path = format!("/api/beregning/avkorting/{behandling_id}");
        let svar = self.http.kall(Method::GET, &path).await?;
        if svar.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        svar.krev_suksess()?.valgfri_json()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::klient::stub::StubServer;
    use crate::klient::{RetryPolicy, StatiskToken};

    #[tokio::test]
    async fn test_missing_avkorting_is_none() {
        let server = StubServer::start(vec![(204, ""), (404, "")]).await;
        let http = HttpKlient::new(
            reqwest::Client::new(),
            server.base_url.as_str(),
            Arc::new(StatiskToken::new("t")),
            RetryPolicy::uten_ventetid(1),
            Duration::from_secs(5),
        );
        let klient = AvkortingKlient::new(http, Duration::from_secs(5));
        let id = Uuid::new_v4();

        assert!(klient.hent_avkorting(id).await.unwrap().is_none());
        assert!(klient.hent_avkorting(id).await.unwrap().is_none());
        assert!(server.requests()[0].starts_with(&format!("get /api/beregning/avkorting/{id} ")));
    }
}
