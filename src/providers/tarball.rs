use crate::archive::{bundle_files, untar_gz, ArtifactKind, ScratchDir};
use crate::error::{CollectorError, Result};
use crate::http::HttpGet;
use crate::models::TimeSlot;
use crate::providers::{store_artifact, JobOutcome, Provider, ProviderSettings};
use crate::sink::Sink;
use crate::utils::batched;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration as ChronoDuration;
use futures::future::join_all;
use regex::Regex;
use reqwest::header::HeaderMap;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a batch download service lives and how its pages are read.
#[derive(Debug, Clone)]
pub struct BatchEndpoints {
    /// Page listing every station.
    pub index_url: String,
    /// Matches one station on the index page, with an `id` group and an
    /// optional `group` group.
    pub station_pattern: String,
    /// chrono format of the request URL for the day before the slot. The
    /// batch's station ids, joined with `.`, are appended.
    pub request_format: String,
    /// Matches the archive link on a request's result page, with a `link`
    /// group relative to `download_base`.
    pub link_pattern: String,
    pub download_base: String,
}

/// Requests the previous day's data for batches of stations, all batches
/// concurrently, and stores every file of every returned `.tar.gz` in one
/// `{slot}.zip`.
///
/// Each batch is a page request that yields a link to a prepared archive,
/// then the archive download. A failed batch is logged and left out.
pub struct TarBatchProvider {
    settings: ProviderSettings,
    sink: Arc<dyn Sink>,
    http: Arc<dyn HttpGet>,
    endpoints: BatchEndpoints,
    station_pattern: Regex,
    link_pattern: Regex,
    batch_size: usize,
    headers: HeaderMap,
}

impl TarBatchProvider {
    pub fn new(
        settings: ProviderSettings,
        sink: Arc<dyn Sink>,
        http: Arc<dyn HttpGet>,
        endpoints: BatchEndpoints,
        batch_size: usize,
    ) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                CollectorError::Config(format!("Invalid pattern '{}': {}", pattern, e))
            })
        };
        let station_pattern = compile(endpoints.station_pattern.as_str())?;
        let link_pattern = compile(endpoints.link_pattern.as_str())?;

        Ok(Self {
            settings,
            sink,
            http,
            endpoints,
            station_pattern,
            link_pattern,
            batch_size,
            headers: HeaderMap::new(),
        })
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Station ids on the index page, in page order.
    pub fn parse_station_ids(&self, html: &str) -> Vec<String> {
        let mut groups: BTreeMap<String, usize> = BTreeMap::new();
        let ids: Vec<String> = self
            .station_pattern
            .captures_iter(html)
            .filter_map(|capture| {
                if let Some(group) = capture.name("group") {
                    *groups.entry(group.as_str().to_string()).or_default() += 1;
                }
                capture.name("id").map(|id| id.as_str().to_string())
            })
            .collect();

        for (group, stations) in &groups {
            info!(%group, stations, "Discovered station group");
        }
        ids
    }

    /// Request URL for one batch, covering the day before `slot`.
    pub fn request_url(&self, slot: TimeSlot, station_ids: &[String]) -> Result<String> {
        let day = slot
            .to_datetime()
            .map(|time| time - ChronoDuration::seconds(self.settings.frequency as i64))
            .ok_or_else(|| {
                CollectorError::InvalidArgument(format!("Slot {} is not a valid time", slot))
            })?;

        Ok(format!(
            "{}{}",
            day.format(&self.endpoints.request_format),
            station_ids.join(".")
        ))
    }

    async fn fetch_station_ids(&self) -> Result<Vec<String>> {
        let url = &self.endpoints.index_url;
        let body = self.http.get(url, &self.headers).await.ok_or_else(|| {
            CollectorError::MissingData(format!("Failed to fetch station list from {}", url))
        })?;
        Ok(self.parse_station_ids(&String::from_utf8_lossy(&body)))
    }

    async fn fetch_batch(&self, index: usize, url: String) -> Result<Bytes> {
        debug!(batch = index + 1, %url, "Requesting batch");
        let page = self.http.get(&url, &self.headers).await.ok_or_else(|| {
            CollectorError::MissingData(format!("No response for batch {}", index + 1))
        })?;

        let page = String::from_utf8_lossy(&page);
        let link = self
            .link_pattern
            .captures(&page)
            .and_then(|capture| capture.name("link"))
            .ok_or_else(|| {
                CollectorError::InvalidFormat(format!("No download link for batch {}", index + 1))
            })?;

        let archive_url = format!(
            "{}/{}",
            self.endpoints.download_base.trim_end_matches('/'),
            link.as_str()
        );
        debug!(batch = index + 1, url = %archive_url, "Downloading batch archive");
        self.http.get(&archive_url, &self.headers).await.ok_or_else(|| {
            CollectorError::MissingData(format!("Failed to download {}", archive_url))
        })
    }
}

#[async_trait]
impl Provider for TarBatchProvider {
    fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    async fn run_job(&mut self, slot: TimeSlot) -> Result<JobOutcome> {
        let station_ids = self.fetch_station_ids().await?;
        if station_ids.is_empty() {
            return Err(CollectorError::InvalidFormat(format!(
                "No station found on {}",
                self.endpoints.index_url
            )));
        }

        let urls = batched(station_ids, self.batch_size)?
            .map(|batch| self.request_url(slot, &batch))
            .collect::<Result<Vec<String>>>()?;
        info!(batches = urls.len(), batch_size = self.batch_size, %slot, "Requesting station batches");

        let results = join_all(
            urls.into_iter()
                .enumerate()
                .map(|(index, url)| self.fetch_batch(index, url)),
        )
        .await;
        let total = results.len();

        let scratch = ScratchDir::new_in(&self.settings.download_path)?;
        let mut extracted: Vec<PathBuf> = Vec::new();
        for (index, result) in results.into_iter().enumerate() {
            let members = match result {
                Ok(archive) => {
                    info!(batch = index + 1, bytes = archive.len(), "Downloaded batch archive");
                    tokio::task::spawn_blocking(move || untar_gz(&archive)).await?
                }
                Err(e) => Err(e),
            };

            match members {
                Ok(members) => {
                    for (name, content) in members {
                        debug!(batch = index + 1, member = %name, bytes = content.len(), "Extracted");
                        match scratch.write_file(&name, &content).await {
                            Ok(path) => extracted.push(path),
                            Err(e) => warn!(member = %name, error = %e, "Skipping archive member"),
                        }
                    }
                }
                Err(e) => warn!(batch = index + 1, error = %e, "Batch failed"),
            }
        }

        info!(files = extracted.len(), batches = total, "Extracted batch archives");
        if extracted.is_empty() {
            return Err(CollectorError::MissingData(format!(
                "None of {} batches produced data",
                total
            )));
        }

        let archive = tokio::task::spawn_blocking(move || bundle_files(&extracted)).await??;
        store_artifact(self.sink.as_ref(), slot.artifact_name(ArtifactKind::Zip), archive).await
    }
}
