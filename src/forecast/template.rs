use crate::archive::scratch::sanitize_file_name;
use crate::forecast::ForecastClient;
use crate::http::HttpGet;
use crate::models::Sensor;
use crate::utils::constants::EXT_JSON;
use anyhow::Context;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub const FORECAST_USER_AGENT: &str = "WeatherForecastCollector/1.0";

/// Headers sent with every forecast request.
pub fn forecast_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(FORECAST_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}

/// Fetches one JSON document per sensor from a URL template and writes it
/// as `{sensor id}.json`.
///
/// `{id}`, `{lat}` and `{lon}` in the template are replaced per sensor. A
/// sensor whose request fails is skipped; failing to write a file fails
/// the snapshot.
pub struct TemplateForecastClient {
    http: Arc<dyn HttpGet>,
    url_template: String,
    sensors: Vec<Sensor>,
    headers: HeaderMap,
}

impl TemplateForecastClient {
    pub fn new(http: Arc<dyn HttpGet>, url_template: impl Into<String>, sensors: Vec<Sensor>) -> Self {
        Self {
            http,
            url_template: url_template.into(),
            sensors,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn url_for(&self, sensor: &Sensor) -> String {
        self.url_template
            .replace("{id}", &sensor.id)
            .replace("{lat}", &sensor.lat.to_string())
            .replace("{lon}", &sensor.lon.to_string())
    }

    async fn fetch_sensor(&self, sensor: &Sensor, download_path: &Path) -> anyhow::Result<bool> {
        let url = self.url_for(sensor);
        let Some(body) = self.http.get(&url, &self.headers).await else {
            warn!(sensor = %sensor.id, "No forecast for sensor");
            return Ok(false);
        };

        let file_name = format!("{}.{}", sensor.id, EXT_JSON);
        let file_name = sanitize_file_name(&file_name)?;
        let dest = download_path.join(file_name);
        tokio::fs::write(&dest, &body)
            .await
            .with_context(|| format!("Failed to write forecast to {}", dest.display()))?;
        Ok(true)
    }
}

#[async_trait]
impl ForecastClient for TemplateForecastClient {
    async fn get_forecast(&self, download_path: &Path, parallelism: usize) -> anyhow::Result<()> {
        let fetches: Vec<_> = self
            .sensors
            .iter()
            .map(|sensor| self.fetch_sensor(sensor, download_path))
            .collect();
        let fetched: Vec<bool> = stream::iter(fetches)
            .buffer_unordered(parallelism.max(1))
            .try_collect()
            .await?;

        let succeeded = fetched.iter().filter(|ok| **ok).count();
        info!(succeeded, sensors = self.sensors.len(), "Downloaded forecasts");
        Ok(())
    }
}
