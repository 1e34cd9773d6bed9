use std::sync::Arc;

use anyhow::{Context, Result};
use beregning_kafka::klient::{
    AvkortingKlient, BeregningKlient, HttpKlient, StatiskToken, TokenKilde, TrygdetidKlient,
};
use beregning_kafka::{registrer, Config, Tjenester};
use elv::{RapidsBuilder, StdioBus};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = Config::load().context("loading configuration")?;
    info!(
        beregning_url = %config.beregning_url,
        trygdetid_url = %config.trygdetid_url,
        max_in_flight = config.rapids.max_in_flight,
        "starting beregning-kafka"
    );

    let tjenester = tjenester(&config)?;
    let bus = Arc::new(StdioBus::new());
    let subscription = bus.subscribe();
    let rapids = registrer(RapidsBuilder::new(), &tjenester)
        .with_config(config.rapids_config())
        .build(bus);

    rapids
        .run_until(subscription, async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!(%error, "could not listen for ctrl-c");
            }
        })
        .await
}

fn tjenester(config: &Config) -> Result<Tjenester> {
    let http = reqwest::Client::builder()
        .connect_timeout(config.timeout())
        .build()
        .context("building http client")?;
    let token: Arc<dyn TokenKilde> =
        Arc::new(StatiskToken::new(config.token.clone().unwrap_or_default()));

    let beregning_http = HttpKlient::new(
        http.clone(),
        config.beregning_url.clone(),
        Arc::clone(&token),
        config.retry.clone(),
        config.timeout(),
    );
    let trygdetid_http = HttpKlient::new(
        http,
        config.trygdetid_url.clone(),
        token,
        config.retry.clone(),
        config.timeout(),
    );

    Ok(Tjenester {
        beregning: Arc::new(BeregningKlient::new(beregning_http.clone(), config.tung_timeout())),
        avkorting: Arc::new(AvkortingKlient::new(beregning_http, config.tung_timeout())),
        trygdetid: Arc::new(TrygdetidKlient::new(trygdetid_http)),
    })
}
