use crate::archive::ArtifactKind;
use crate::error::{CollectorError, Result};
use crate::http::HttpGet;
use crate::models::{ChunkResponse, MergedResponse, TimeSlot};
use crate::providers::{store_artifact, JobOutcome, Provider, ProviderSettings};
use crate::sink::Sink;
use crate::utils::batched;
use crate::utils::constants::{DEFAULT_STATION_CHUNK_SIZE, DEFAULT_WINDOW_HOURS, WINDOW_TIME_FORMAT};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use futures::future::join_all;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Queries a station API in fixed-size chunks of station ids, all chunks
/// concurrently, and stores the merged JSON as `{slot}.json`.
pub struct ChunkedApiProvider {
    settings: ProviderSettings,
    sink: Arc<dyn Sink>,
    http: Arc<dyn HttpGet>,
    endpoint: String,
    stations_url: String,
    parameters: String,
    chunk_size: usize,
    window: ChronoDuration,
    headers: HeaderMap,
}

impl ChunkedApiProvider {
    pub fn new(
        settings: ProviderSettings,
        sink: Arc<dyn Sink>,
        http: Arc<dyn HttpGet>,
        endpoint: impl Into<String>,
        parameters: impl Into<String>,
    ) -> Self {
        let endpoint = endpoint.into();
        let stations_url = format!("{}/metadata", endpoint.trim_end_matches('/'));
        Self {
            settings,
            sink,
            http,
            endpoint,
            stations_url,
            parameters: parameters.into(),
            chunk_size: DEFAULT_STATION_CHUNK_SIZE,
            window: ChronoDuration::hours(DEFAULT_WINDOW_HOURS),
            headers: HeaderMap::new(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn stations_url(&self) -> &str {
        &self.stations_url
    }

    /// Request URL for one chunk, covering `slot` ± the window.
    pub fn chunk_url(&self, slot: TimeSlot, station_ids: &[String]) -> Result<String> {
        let center = slot.to_datetime().ok_or_else(|| {
            CollectorError::InvalidArgument(format!("Slot {} is not a valid time", slot))
        })?;
        let start = (center - self.window).format(WINDOW_TIME_FORMAT);
        let end = (center + self.window).format(WINDOW_TIME_FORMAT);

        Ok(format!(
            "{}?parameters={}&station_ids={}&start={}&end={}",
            self.endpoint,
            self.parameters,
            station_ids.join(","),
            start,
            end
        ))
    }

    async fn fetch_station_ids(&self) -> Result<Vec<String>> {
        let body = self
            .http
            .get(&self.stations_url, &self.headers)
            .await
            .ok_or_else(|| {
                CollectorError::MissingData(format!(
                    "Failed to fetch station metadata from {}",
                    self.stations_url
                ))
            })?;
        let metadata: Value = serde_json::from_slice(&body)?;
        Ok(active_station_ids(&metadata))
    }

    async fn fetch_chunk(&self, slot: TimeSlot, index: usize, station_ids: &[String]) -> Result<ChunkResponse> {
        let url = self.chunk_url(slot, station_ids)?;
        debug!(chunk = index + 1, stations = station_ids.len(), %url, "Requesting chunk");

        let body = self.http.get(&url, &self.headers).await.ok_or_else(|| {
            CollectorError::MissingData(format!("No response for chunk {}", index + 1))
        })?;
        ChunkResponse::parse(index, body)
    }
}

/// Ids of stations flagged `is_active`, in metadata order. Numeric ids are
/// rendered as strings.
pub fn active_station_ids(metadata: &Value) -> Vec<String> {
    let Some(stations) = metadata.get("stations").and_then(Value::as_array) else {
        return Vec::new();
    };

    stations
        .iter()
        .filter(|station| station.get("is_active").and_then(Value::as_bool) == Some(true))
        .filter_map(|station| match station.get("id") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl Provider for ChunkedApiProvider {
    fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    async fn run_job(&mut self, slot: TimeSlot) -> Result<JobOutcome> {
        let station_ids = self.fetch_station_ids().await?;
        if station_ids.is_empty() {
            return Ok(JobOutcome::NoData("no active station ids".to_string()));
        }

        let chunks: Vec<Vec<String>> = batched(station_ids, self.chunk_size)?.collect();
        info!(chunks = chunks.len(), chunk_size = self.chunk_size, %slot, "Requesting station chunks");

        let results = join_all(
            chunks
                .iter()
                .enumerate()
                .map(|(index, chunk)| self.fetch_chunk(slot, index, chunk)),
        )
        .await;

        let responses: Vec<ChunkResponse> = results
            .into_iter()
            .enumerate()
            .filter_map(|(index, result)| match result {
                Ok(response) => Some(response),
                Err(e) => {
                    warn!(chunk = index + 1, error = %e, "Chunk failed");
                    None
                }
            })
            .collect();

        info!(succeeded = responses.len(), total = chunks.len(), "Chunks completed");
        if responses.is_empty() {
            return Err(CollectorError::MissingData(format!(
                "All {} chunks failed",
                chunks.len()
            )));
        }

        let merged = MergedResponse::merge(responses);
        info!(
            timestamps = merged.timestamps().len(),
            features = merged.features().len(),
            "Merged chunk responses"
        );

        let bytes = merged.into_bytes()?;
        store_artifact(self.sink.as_ref(), slot.artifact_name(ArtifactKind::Json), bytes).await
    }
}
