pub mod chunked;
pub mod crawl;
pub mod presets;
pub mod single;
pub mod tarball;

#[cfg(test)]
pub(crate) mod testing;

pub use chunked::ChunkedApiProvider;
pub use crawl::DirectoryCrawlProvider;
pub use presets::{PresetOptions, SensorSource};
pub use single::SingleEndpointProvider;
pub use tarball::{BatchEndpoints, TarBatchProvider};

use crate::error::Result;
use crate::models::TimeSlot;
use crate::sink::Sink;
use crate::utils::constants::DEFAULT_TIMEOUT_SECS;
use crate::utils::timeout_duration;
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use validator::Validate;

/// Identity and cadence shared by every provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ProviderSettings {
    #[validate(length(min = 1))]
    pub service: String,

    /// Tick period in seconds.
    #[validate(range(min = 1))]
    pub frequency: u64,

    /// Seconds to wait after the boundary before fetching.
    pub delay: u64,

    /// Scratch space for in-flight jobs.
    pub download_path: PathBuf,

    /// Total timeout of every HTTP request, in seconds.
    #[validate(range(min = 0.001, max = 86400.0))]
    pub timeout_secs: f64,
}

impl ProviderSettings {
    pub fn new(
        service: impl Into<String>,
        frequency: u64,
        delay: u64,
        download_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            service: service.into(),
            frequency,
            delay,
            download_path: download_path.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout_secs(mut self, timeout_secs: f64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn timeout(&self) -> Result<Duration> {
        timeout_duration(self.timeout_secs)
    }
}

/// What one fetch-job did. Only `Stored` involved the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Stored { key: String, bytes: usize },
    /// Upstream metadata checksum matched the previous tick.
    Unchanged,
    /// Nothing to fetch this tick; not an error.
    NoData(String),
    Failed(String),
}

impl JobOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, JobOutcome::Stored { .. })
    }
}

/// A vendor's periodic fetch-and-archive unit.
#[async_trait]
pub trait Provider: Send {
    fn settings(&self) -> &ProviderSettings;

    /// Fetch, assemble and store the artifact for `slot`.
    async fn run_job(&mut self, slot: TimeSlot) -> Result<JobOutcome>;

    /// Run the job for `slot`, turning every error and panic into a logged
    /// [`JobOutcome::Failed`]. Never fails.
    async fn fetch_job(&mut self, slot: TimeSlot) -> JobOutcome {
        let service = self.settings().service.clone();

        let outcome = match AssertUnwindSafe(self.run_job(slot)).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => JobOutcome::Failed(e.to_string()),
            Err(panic) => JobOutcome::Failed(format!("job panicked: {}", panic_message(panic.as_ref()))),
        };

        match &outcome {
            JobOutcome::Stored { key, bytes } => {
                info!(%service, %slot, %key, bytes, "Stored artifact")
            }
            JobOutcome::Unchanged => info!(%service, %slot, "Upstream unchanged, nothing stored"),
            JobOutcome::NoData(reason) => warn!(%service, %slot, %reason, "No data this tick"),
            JobOutcome::Failed(reason) => {
                error!(%service, %slot, %reason, "Error fetching data")
            }
        }

        outcome
    }
}

/// Hand a finished artifact to the sink.
pub(crate) async fn store_artifact(sink: &dyn Sink, key: String, bytes: Vec<u8>) -> Result<JobOutcome> {
    let size = bytes.len();
    sink.store(&key, bytes).await?;
    Ok(JobOutcome::Stored { key, bytes: size })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
