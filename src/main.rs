mod api;
mod config;
mod error;
mod format_job;
mod storage;
#[cfg(test)]
mod testing;

use anyhow::{bail, Context};
use api::{AvailabilityProbe, PriceFetcher, ReqwestClient};
use config::Settings;
use std::sync::Arc;
use storage::{ArtifactLocator, ObjectStore, PricePersister, S3ObjectStore};
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Polls the availability probe until the API answers or the probe timeout elapses.
///
/// # Returns
/// The resolved query URL reported by the successful poke
async fn wait_for_api(probe: &AvailabilityProbe, settings: &Settings) -> anyhow::Result<String> {
    let deadline = Instant::now() + settings.probe_timeout;

    loop {
        let outcome = probe.poke().await;
        if outcome.done {
            return Ok(outcome.url);
        }
        if Instant::now() + settings.poke_interval > deadline {
            bail!(
                "{} not available within {:?}",
                outcome.url,
                settings.probe_timeout
            );
        }
        warn!(
            retry_in = ?settings.poke_interval,
            "API unavailable, poking again"
        );
        sleep(settings.poke_interval).await;
    }
}

/// Runs one ingestion for the configured symbol.
///
/// Each stage hands the next a plain string: query URL, serialized record,
/// storage path, and finally the formatted CSV key.
async fn run_pipeline(settings: &Settings) -> anyhow::Result<()> {
    let http = Arc::new(ReqwestClient::new(settings.http_timeout)?);

    let probe = AvailabilityProbe::new(settings.api.clone(), http.clone());
    let url = wait_for_api(&probe, settings).await?;

    let fetcher = PriceFetcher::new(http, settings.api.headers.clone())
        .with_window(&settings.interval, &settings.range);
    let record = fetcher
        .fetch(&url, &settings.symbol)
        .await
        .with_context(|| format!("fetching prices for {}", settings.symbol))?;

    let store: Arc<dyn ObjectStore> =
        Arc::new(S3ObjectStore::new(&settings.storage, settings.storage_timeout));
    let persister = PricePersister::new(store.clone(), &settings.bucket);
    let path = persister
        .store_prices(&record)
        .await
        .context("storing prices")?;

    let Some(job) = &settings.format_job else {
        info!(%path, "no format job configured, stopping after storage");
        return Ok(());
    };
    job.run(&path).await.context("formatting prices")?;

    let csv = ArtifactLocator::new(store)
        .formatted_csv(&path)
        .await
        .context("locating formatted csv")?;
    info!(%csv, "pipeline finished");

    Ok(())
}

/// Entry point: ingests daily prices for one symbol into the object store.
///
/// # Workflow Steps
/// - Load settings from the environment (and `.env`)
/// - Poll the market-data API until it answers
/// - Fetch the chart, store the raw record, optionally run the format job
/// - Locate the formatted CSV
///
/// Ctrl-C drops the in-flight stage, which cancels its network call or
/// kills the format container.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env().context("loading settings")?;
    info!(symbol = %settings.symbol, bucket = %settings.bucket, "starting stock market pipeline");

    tokio::select! {
        result = run_pipeline(&settings) => {
            if let Err(err) = &result {
                let retryable = err
                    .downcast_ref::<error::PipelineError>()
                    .is_some_and(error::PipelineError::is_retryable);
                error!(error = %format!("{err:#}"), retryable, "pipeline failed");
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, abandoning run");
            bail!("interrupted")
        }
    }
}
