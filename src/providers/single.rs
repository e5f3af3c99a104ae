use crate::archive::{gunzip, ArtifactKind};
use crate::error::{CollectorError, Result};
use crate::http::HttpGet;
use crate::models::TimeSlot;
use crate::providers::{store_artifact, JobOutcome, Provider, ProviderSettings};
use crate::sink::Sink;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use tracing::debug;

/// Fetches one URL per tick and stores the body as `{slot}.{ext}`.
pub struct SingleEndpointProvider {
    settings: ProviderSettings,
    sink: Arc<dyn Sink>,
    http: Arc<dyn HttpGet>,
    url: String,
    headers: HeaderMap,
    kind: ArtifactKind,
    gzipped: bool,
}

impl SingleEndpointProvider {
    pub fn new(
        settings: ProviderSettings,
        sink: Arc<dyn Sink>,
        http: Arc<dyn HttpGet>,
        url: impl Into<String>,
        kind: ArtifactKind,
    ) -> Self {
        Self {
            settings,
            sink,
            http,
            url: url.into(),
            headers: HeaderMap::new(),
            kind,
            gzipped: false,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// The endpoint serves a gzip stream that is stored inflated.
    pub fn gzipped(mut self, gzipped: bool) -> Self {
        self.gzipped = gzipped;
        self
    }
}

#[async_trait]
impl Provider for SingleEndpointProvider {
    fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    async fn run_job(&mut self, slot: TimeSlot) -> Result<JobOutcome> {
        debug!(url = %self.url, %slot, "Fetching endpoint");

        let body = self.http.get(&self.url, &self.headers).await.ok_or_else(|| {
            CollectorError::MissingData(format!("No response from {}", self.url))
        })?;

        let bytes = if self.gzipped {
            gunzip(&body)?
        } else {
            body.to_vec()
        };

        store_artifact(self.sink.as_ref(), slot.artifact_name(self.kind), bytes).await
    }
}
