pub mod template;

pub use template::{forecast_headers, TemplateForecastClient};

use crate::archive::{zip_directory, ArtifactKind};
use crate::error::{CollectorError, Result};
use crate::models::TimeSlot;
use crate::sink::Sink;
use crate::utils::constants::DEFAULT_FORECAST_PERIOD;
use crate::utils::{Clock, SystemClock};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Writes one forecast snapshot into a directory.
#[async_trait]
pub trait ForecastClient: Send + Sync {
    /// Populate `download_path` with this snapshot's files, using at most
    /// `parallelism` concurrent requests.
    async fn get_forecast(&self, download_path: &Path, parallelism: usize) -> anyhow::Result<()>;
}

/// Builds a fresh client for every snapshot.
pub type ClientFactory = Box<dyn Fn() -> Result<Box<dyn ForecastClient>> + Send + Sync>;

/// A collected snapshot on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub slot: TimeSlot,
    pub directory: PathBuf,
    pub archive: PathBuf,
    pub archive_size: u64,
}

/// Collects one zipped forecast snapshot per period boundary.
///
/// Unlike the sensor providers, failures are not isolated here: a client,
/// archive or upload error ends [`SnapshotDownloader::run`].
pub struct SnapshotDownloader {
    download_path: PathBuf,
    sink: Option<Arc<dyn Sink>>,
    parallelism: usize,
    period: u64,
    keep_local_snapshots: bool,
    clock: Arc<dyn Clock>,
    client_factory: ClientFactory,
}

impl SnapshotDownloader {
    pub fn new(download_path: impl Into<PathBuf>, client_factory: ClientFactory) -> Self {
        Self {
            download_path: download_path.into(),
            sink: None,
            parallelism: num_cpus::get(),
            period: DEFAULT_FORECAST_PERIOD,
            keep_local_snapshots: false,
            clock: Arc::new(SystemClock),
            client_factory,
        }
    }

    /// Upload every archive here; without a sink snapshots stay local only.
    pub fn with_sink(mut self, sink: Option<Arc<dyn Sink>>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_period(mut self, period: u64) -> Self {
        self.period = period.max(1);
        self
    }

    pub fn keep_local_snapshots(mut self, keep: bool) -> Self {
        self.keep_local_snapshots = keep;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Collect snapshots at consecutive boundaries until `max_snapshots`
    /// have been collected, or forever. Returns the number collected.
    pub async fn run(&self, max_snapshots: Option<u64>) -> Result<u64> {
        info!(
            destination = %self
                .sink
                .as_ref()
                .map(|sink| sink.describe())
                .unwrap_or_else(|| "local only".to_string()),
            download_path = %self.download_path.display(),
            period = self.period,
            "Starting forecast download"
        );

        let mut collected: u64 = 0;
        while max_snapshots.map_or(true, |max| collected < max) {
            let now = self.clock.now();
            let slot = TimeSlot::following(now, self.period);
            let wait = slot.seconds_from(now);
            info!(%slot, wait_secs = wait, "Next download scheduled");
            tokio::time::sleep(Duration::from_secs(wait)).await;

            let client = (self.client_factory)()?;
            let snapshot = self.collect(slot, client.as_ref()).await?;

            collected += 1;
            match max_snapshots {
                Some(max) => info!(%slot, collected, total = max, "Snapshot collected"),
                None => info!(%slot, collected, "Snapshot collected"),
            }

            if !self.keep_local_snapshots {
                info!(
                    directory = %snapshot.directory.display(),
                    archive = %snapshot.archive.display(),
                    "Removing local snapshot"
                );
                tokio::fs::remove_dir_all(&snapshot.directory).await?;
                tokio::fs::remove_file(&snapshot.archive).await?;
            }
        }

        Ok(collected)
    }

    /// Download, zip and upload the snapshot for `slot`.
    pub async fn collect(&self, slot: TimeSlot, client: &dyn ForecastClient) -> Result<Snapshot> {
        let dir_name = slot.to_string();
        let directory = self.download_path.join(&dir_name);

        // Leftovers of an interrupted run for the same slot
        match tokio::fs::remove_dir_all(&directory).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&self.download_path).await?;
        tokio::fs::create_dir(&directory).await?;

        client
            .get_forecast(&directory, self.parallelism)
            .await
            .map_err(CollectorError::ForecastClient)?;

        let key = slot.artifact_name(ArtifactKind::Zip);
        let archive = self.download_path.join(&key);
        let archive_size = {
            let root = self.download_path.clone();
            let dest = archive.clone();
            tokio::task::spawn_blocking(move || zip_directory(&root, &dir_name, &dest)).await??
        };

        if let Some(sink) = &self.sink {
            info!(
                %slot,
                size_mb = %format!("{:.2}", archive_size as f64 / 1024.0 / 1024.0),
                destination = %sink.describe(),
                "Uploading snapshot"
            );
            let bytes = tokio::fs::read(&archive).await?;
            sink.store(&key, bytes).await?;
        }

        Ok(Snapshot {
            slot,
            directory,
            archive,
            archive_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::RecordingSink;
    use crate::utils::MonotonicClock;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use zip::ZipArchive;

    const START: i64 = 1_700_000_123;

    struct StaticClient {
        files: Vec<(&'static str, &'static str)>,
    }

    #[async_trait]
    impl ForecastClient for StaticClient {
        async fn get_forecast(&self, download_path: &Path, _parallelism: usize) -> anyhow::Result<()> {
            for (name, content) in &self.files {
                tokio::fs::write(download_path.join(name), content).await?;
            }
            Ok(())
        }
    }

    struct BrokenClient;

    #[async_trait]
    impl ForecastClient for BrokenClient {
        async fn get_forecast(&self, _download_path: &Path, _parallelism: usize) -> anyhow::Result<()> {
            anyhow::bail!("token expired")
        }
    }

    fn static_factory(builds: Arc<AtomicUsize>) -> ClientFactory {
        Box::new(move || {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StaticClient {
                files: vec![("s1.json", "{\"rain\": 0.2}"), ("s2.json", "{\"rain\": 0.0}")],
            }) as Box<dyn ForecastClient>)
        })
    }

    fn entry_names(bytes: &[u8]) -> Vec<String> {
        let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test(start_paused = true)]
    async fn test_collects_exactly_n_snapshots_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let builds = Arc::new(AtomicUsize::new(0));
        let downloader = SnapshotDownloader::new(dir.path(), static_factory(builds.clone()))
            .with_sink(Some(sink.clone() as Arc<dyn Sink>))
            .with_clock(Arc::new(MonotonicClock::starting_at(START)));

        let collected = downloader.run(Some(2)).await.unwrap();

        assert_eq!(collected, 2);
        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert_eq!(sink.keys(), vec!["1700002800.zip", "1700006400.zip"]);
        assert_eq!(
            entry_names(&sink.stored()[0].1),
            vec!["1700002800/", "1700002800/s1.json", "1700002800/s2.json"]
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keeps_local_snapshots_without_sink() {
        let dir = TempDir::new().unwrap();
        let downloader = SnapshotDownloader::new(dir.path(), static_factory(Arc::new(AtomicUsize::new(0))))
            .keep_local_snapshots(true)
            .with_clock(Arc::new(MonotonicClock::starting_at(START)));

        downloader.run(Some(1)).await.unwrap();

        assert!(dir.path().join("1700002800").join("s1.json").exists());
        assert!(dir.path().join("1700002800.zip").exists());
    }

    #[tokio::test]
    async fn test_stale_snapshot_directory_is_replaced() {
        let dir = TempDir::new().unwrap();
        let stale = dir.path().join("1700002800");
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("stale.json"), "{}").unwrap();

        let downloader = SnapshotDownloader::new(dir.path(), static_factory(Arc::new(AtomicUsize::new(0))));
        let client = StaticClient {
            files: vec![("fresh.json", "{}")],
        };
        let snapshot = downloader
            .collect(TimeSlot::new(1_700_002_800, 3600).unwrap(), &client)
            .await
            .unwrap();

        assert!(!stale.join("stale.json").exists());
        assert!(snapshot.directory.join("fresh.json").exists());
        assert!(snapshot.archive_size > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_propagates_and_nothing_is_uploaded() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let factory: ClientFactory = Box::new(|| Ok(Box::new(BrokenClient) as Box<dyn ForecastClient>));
        let downloader = SnapshotDownloader::new(dir.path(), factory)
            .with_sink(Some(sink.clone() as Arc<dyn Sink>))
            .with_clock(Arc::new(MonotonicClock::starting_at(START)));

        let result = downloader.run(Some(3)).await;

        match result {
            Err(CollectorError::ForecastClient(e)) => assert_eq!(e.to_string(), "token expired"),
            other => panic!("expected client error, got {:?}", other),
        }
        assert!(sink.stored().is_empty());
    }
}
