use async_trait::async_trait;
use reqwest::Method;
use uuid::Uuid;

use super::{HttpKlient, KlientError};

#[async_trait]
pub trait TrygdetidService: Send + Sync {
    /// Copy the trygdetid of the previous behandling onto the new one.
    async fn kopier_trygdetid(
        &self,
        behandling_id: Uuid,
        forrige_behandling_id: Uuid,
    ) -> Result<(), KlientError>;
}

pub struct TrygdetidKlient {
    http: HttpKlient,
}

impl TrygdetidKlient {
    pub fn new(http: HttpKlient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl TrygdetidService for TrygdetidKlient {
    async fn kopier_trygdetid(
        &self,
        behandling_id: Uuid,
        forrige_behandling_id: Uuid,
    ) -> Result<(), KlientError> {
        let path = format!("/api/trygdetid/{behandling_id}/kopier/{forrige_behandling_id}");
        self.http.kall(Method::GET, &path).await?.krev_suksess()?;
        Ok(())
    }
}
