use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Method, StatusCode};
use tracing::info;
use uuid::Uuid;

use super::{HttpKlient, KlientError};
use crate::domene::{BeregningDto, Grunnbeloep, OverstyrtBeregning};

/// Calls against the beregning service.
#[async_trait]
pub trait BeregningService: Send + Sync {
    /// Carry the calculation basis of the previous behandling over to the new one.
    async fn opprett_beregningsgrunnlag_fra_forrige(
        &self,
        behandling_id: Uuid,
        forrige_behandling_id: Uuid,
    ) -> Result<(), KlientError>;

    /// Rebase an overridden calculation basis onto the new grunnbeløp.
    async fn tilpass_overstyrt_beregningsgrunnlag_regulering(
        &self,
        behandling_id: Uuid,
    ) -> Result<(), KlientError>;

    async fn beregn(&self, behandling_id: Uuid) -> Result<BeregningDto, KlientError>;

    /// `None` when the behandling has no beregning.
    async fn hent_beregning(&self, behandling_id: Uuid) -> Result<Option<BeregningDto>, KlientError>;

    async fn hent_overstyrt_beregning(
        &self,
        behandling_id: Uuid,
    ) -> Result<OverstyrtBeregning, KlientError>;

    async fn hent_grunnbeloep(&self, dato: NaiveDate) -> Result<Grunnbeloep, KlientError>;
}

pub struct BeregningKlient {
    http: HttpKlient,
    tung_timeout: Duration,
}

impl BeregningKlient {
    /// `tung_timeout` applies to `beregn`, which may take a while on long cases.
    pub fn new(http: HttpKlient, tung_timeout: Duration) -> Self {
        Self { http, tung_timeout }
    }
}

#[async_trait]
impl BeregningService for BeregningKlient {
    async fn opprett_beregningsgrunnlag_fra_forrige(
        &self,
        behandling_id: Uuid,
        forrige_behandling_id: Uuid,
    ) -> Result<(), KlientError> {
        let path = format!("/api/beregning/beregningsgrunnlag/{behandling_id}/fra/{forrige_behandling_id}");
        self.http.kall(Method::POST, &path).await?.krev_suksess()?;
        Ok(())
    }

    async fn tilpass_overstyrt_beregningsgrunnlag_regulering(
        &self,
        behandling_id: Uuid,
    ) -> Result<(), KlientError> {
        let path = format!("/api/beregning/beregningsgrunnlag/{behandling_id}/overstyr/regulering");
        self.http.kall(Method::POST, &path).await?.krev_suksess()?;
        Ok(())
    }

    async fn beregn(&self, behandling_id: Uuid) -> Result<BeregningDto, KlientError> {
        let path = format!("/api/beregning/{behandling_id}");
        self.http
            .kall_med_timeout(Method::POST, &path, self.tung_timeout)
            .await?
            .krev_suksess()?
            .json()
    }

    async fn hent_beregning(&self, behandling_id: Uuid) -> Result<Option<BeregningDto>, KlientError> {
        let path = format!("/api/beregning/{behandling_id}");
        let svar = self.http.kall(Method::GET, &path).await?;
        if svar.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        svar.krev_suksess()?.valgfri_json()
    }

    async fn hent_overstyrt_beregning(
        &self,
        behandling_id: Uuid,
    ) -> Result<OverstyrtBeregning, KlientError> {
        let path = format!("/api/beregning/{behandling_id}/overstyrt");
        let svar = self.http.kall(Method::GET, &path).await?;
        let overstyrt = match svar.status {
            StatusCode::NO_CONTENT => OverstyrtBeregning::Ingen,
            StatusCode::OK => OverstyrtBeregning::Finnes,
            status => OverstyrtBeregning::Ukjent {
                status: status.as_u16(),
            },
        };
        if overstyrt != OverstyrtBeregning::Ingen {
            info!(%behandling_id, ?overstyrt, "oppslag av overstyrt beregning");
        }
        Ok(overstyrt)
    }

    async fn hent_grunnbeloep(&self, dato: NaiveDate) -> Result<Grunnbeloep, KlientError> {
        let path = format!("/api/beregning/grunnbeloep/{dato}");
        self.http.kall(Method::GET, &path).await?.krev_suksess()?.json()
    }
}
