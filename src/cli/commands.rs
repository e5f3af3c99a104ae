use crate::cli::args::{snapshots_for_days, Cli, Commands};
use crate::config::Settings;
use crate::error::{CollectorError, Result};
use crate::forecast::{
    forecast_headers, ClientFactory, ForecastClient, SnapshotDownloader, TemplateForecastClient,
};
use crate::http::HttpClient;
use crate::models::Sensor;
use crate::providers::{PresetOptions, SensorSource};
use crate::scheduler::Scheduler;
use crate::sink::{sink_from_uri, Sink};
use crate::utils::constants::DEFAULT_TIMEOUT_SECS;
use crate::utils::{init_logging, timeout_duration};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose, cli.log_file.as_deref())?;
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Sensors {
            source,
            storage_uri,
            download_path,
            frequency,
            delay,
            max_ticks,
        } => {
            let options = PresetOptions {
                download_path: download_path.unwrap_or_else(|| settings.download_path.clone()),
                frequency,
                delay,
                timeout_secs: settings.http.timeout_secs,
                retry: settings.http.retry_policy(),
            };
            let storage_uri = storage_uri.or(settings.storage_uri).ok_or_else(|| {
                CollectorError::Config("--storage-uri (or storage_uri setting) is required".to_string())
            })?;

            run_sensors(source, &storage_uri, &options, max_ticks).await
        }

        Commands::Forecast {
            download_path,
            storage_uri,
            parallelism,
            days,
            download_period,
            keep_local_snapshots,
            sensors,
            include_countries,
            url_template,
        } => {
            let sensors_path = sensors.or(settings.forecast.sensors.clone()).ok_or_else(|| {
                CollectorError::Config("--sensors (or forecast.sensors setting) is required".to_string())
            })?;
            let url_template = url_template
                .or(settings.forecast.url_template.clone())
                .ok_or_else(|| {
                    CollectorError::Config(
                        "--url-template (or forecast.url_template setting) is required".to_string(),
                    )
                })?;
            let include_countries = if include_countries.is_empty() {
                settings.forecast.include_countries.clone()
            } else {
                include_countries
            };

            let sink = match storage_uri.or(settings.storage_uri.clone()) {
                Some(uri) => Some(sink_from_uri(&uri).await?),
                None => None,
            };

            let downloader = ForecastJob {
                sensors_path,
                include_countries,
                url_template,
                download_path: download_path.unwrap_or_else(|| settings.download_path.clone()),
                parallelism: parallelism
                    .or(settings.forecast.parallelism)
                    .unwrap_or_else(num_cpus::get),
                download_period,
                keep_local_snapshots,
            }
            .build(&settings, sink)?;

            let collected = downloader.run(snapshots_for_days(days)).await?;
            info!(collected, "Forecast download finished");
            Ok(())
        }
    }
}

async fn run_sensors(
    source: SensorSource,
    storage_uri: &str,
    options: &PresetOptions,
    max_ticks: Option<u64>,
) -> Result<()> {
    let sink = sink_from_uri(storage_uri).await?;
    info!(
        source = source.service(),
        destination = %sink.describe(),
        download_path = %options.download_path.display(),
        "Starting sensor collection"
    );

    let mut provider = source.build(sink, options)?;
    let ticks = Scheduler::default()
        .with_max_ticks(max_ticks)
        .run(provider.as_mut())
        .await;

    info!(source = source.service(), ticks, "Sensor collection finished");
    Ok(())
}

/// Resolved `forecast` arguments.
struct ForecastJob {
    sensors_path: PathBuf,
    include_countries: Vec<String>,
    url_template: String,
    download_path: PathBuf,
    parallelism: usize,
    download_period: u64,
    keep_local_snapshots: bool,
}

impl ForecastJob {
    fn build(self, settings: &Settings, sink: Option<Arc<dyn Sink>>) -> Result<SnapshotDownloader> {
        let sensors = Sensor::from_csv(&self.sensors_path, &self.include_countries)?;
        if sensors.is_empty() {
            warn!(
                path = %self.sensors_path.display(),
                countries = ?self.include_countries,
                "No sensors selected, snapshots will be empty"
            );
        } else {
            info!(sensors = sensors.len(), "Loaded sensors");
        }

        let timeout = settings.http.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let http = HttpClient::new(timeout_duration(timeout)?)?
            .with_retry(settings.http.retry_policy());
        let url_template = self.url_template;

        let factory: ClientFactory = Box::new(move || {
            let client = TemplateForecastClient::new(
                Arc::new(http.clone()),
                url_template.clone(),
                sensors.clone(),
            )
            .with_headers(forecast_headers());
            Ok(Box::new(client) as Box<dyn ForecastClient>)
        });

        Ok(SnapshotDownloader::new(self.download_path, factory)
            .with_sink(sink)
            .with_parallelism(self.parallelism)
            .with_period(self.download_period)
            .keep_local_snapshots(self.keep_local_snapshots))
    }
}
