use crate::archive::{bundle_files, ArtifactKind, ScratchDir};
use crate::error::{CollectorError, Result};
use crate::http::{FileLister, HttpGet, RemoteFile};
use crate::models::{ChangeChecksum, TimeSlot};
use crate::providers::{store_artifact, JobOutcome, Provider, ProviderSettings};
use crate::sink::Sink;
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::header::HeaderMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Lists a directory, downloads every file concurrently and stores them as
/// one `{slot}.zip`.
///
/// With a metadata URL configured, the whole tick is skipped while the
/// checksum of that document stays the same. With a listing entry
/// configured, the listing document itself is archived next to the files.
pub struct DirectoryCrawlProvider {
    settings: ProviderSettings,
    sink: Arc<dyn Sink>,
    http: Arc<dyn HttpGet>,
    lister: Arc<dyn FileLister>,
    listing_url: String,
    metadata_url: Option<String>,
    listing_entry: Option<String>,
    headers: HeaderMap,
    last_checksum: Option<ChangeChecksum>,
}

impl DirectoryCrawlProvider {
    pub fn new(
        settings: ProviderSettings,
        sink: Arc<dyn Sink>,
        http: Arc<dyn HttpGet>,
        lister: Arc<dyn FileLister>,
        listing_url: impl Into<String>,
    ) -> Self {
        Self {
            settings,
            sink,
            http,
            lister,
            listing_url: listing_url.into(),
            metadata_url: None,
            listing_entry: None,
            headers: HeaderMap::new(),
            last_checksum: None,
        }
    }

    pub fn with_metadata_url(mut self, metadata_url: impl Into<String>) -> Self {
        self.metadata_url = Some(metadata_url.into());
        self
    }

    /// Store the listing document in the archive as `entry_name`.
    pub fn with_listing_entry(mut self, entry_name: impl Into<String>) -> Self {
        self.listing_entry = Some(entry_name.into());
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Checksum of the metadata document behind the last stored archive.
    pub fn last_checksum(&self) -> Option<&ChangeChecksum> {
        self.last_checksum.as_ref()
    }

    /// `None` when the metadata is unchanged since the last stored archive.
    /// Otherwise the checksum to commit once this tick's archive is stored,
    /// which is absent when there is no metadata to compare.
    async fn check_metadata(&self) -> Option<Option<ChangeChecksum>> {
        let Some(url) = &self.metadata_url else {
            return Some(None);
        };

        let Some(body) = self.http.get(url, &self.headers).await else {
            error!(%url, "Failed to fetch metadata, downloading anyway");
            return Some(None);
        };

        let checksum = ChangeChecksum::of(&body);
        match &self.last_checksum {
            Some(previous) if *previous == checksum => {
                info!(checksum = checksum.short(), "Metadata unchanged, skipping download");
                None
            }
            Some(previous) => {
                info!(
                    from = previous.short(),
                    to = checksum.short(),
                    "Metadata changed"
                );
                Some(Some(checksum))
            }
            None => Some(Some(checksum)),
        }
    }
}

async fn download(
    http: &dyn HttpGet,
    headers: &HeaderMap,
    scratch: &ScratchDir,
    file: &RemoteFile,
) -> Option<PathBuf> {
    let body = http.get(&file.url, headers).await?;
    match scratch.write_file(&file.name, &body).await {
        Ok(path) => Some(path),
        Err(e) => {
            warn!(file = %file.name, error = %e, "Failed to write download");
            None
        }
    }
}

#[async_trait]
impl Provider for DirectoryCrawlProvider {
    fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    async fn run_job(&mut self, slot: TimeSlot) -> Result<JobOutcome> {
        let Some(pending_checksum) = self.check_metadata().await else {
            return Ok(JobOutcome::Unchanged);
        };

        let listing = self.lister.list(&self.listing_url).await?;
        let files = &listing.files;
        if files.is_empty() {
            return Err(CollectorError::MissingData(format!(
                "No files listed at {}",
                self.listing_url
            )));
        }

        let scratch = ScratchDir::new_in(&self.settings.download_path)?;
        let http = self.http.as_ref();
        let downloads = join_all(
            files
                .iter()
                .map(|file| download(http, &self.headers, &scratch, file)),
        )
        .await;

        let mut downloaded: Vec<PathBuf> = downloads.into_iter().flatten().collect();
        info!(
            downloaded = downloaded.len(),
            listed = files.len(),
            url = %self.listing_url,
            "Finished downloads"
        );
        if downloaded.is_empty() {
            return Err(CollectorError::MissingData(format!(
                "None of {} files could be downloaded",
                files.len()
            )));
        }

        if let Some(entry_name) = &self.listing_entry {
            downloaded.insert(0, scratch.write_file(entry_name, &listing.body).await?);
        }

        let archive = tokio::task::spawn_blocking(move || bundle_files(&downloaded)).await??;
        let outcome =
            store_artifact(self.sink.as_ref(), slot.artifact_name(ArtifactKind::Zip), archive).await?;

        if let Some(checksum) = pending_checksum {
            self.last_checksum = Some(checksum);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HrefLister;
    use crate::providers::testing::{FakeHttp, RecordingSink};
    use std::io::{Cursor, Read};
    use tempfile::TempDir;
    use zip::ZipArchive;

    const BASE: &str = "https://opendata.example.org/10_minutes/precipitation/now/";
    const META: &str =
        "https://opendata.example.org/10_minutes/precipitation/now/zehn_now_rr_Beschreibung_Stationen.txt";

    fn index(names: &[&str]) -> String {
        names
            .iter()
            .map(|name| format!("<a href=\"{}\">{}</a>\n", name, name))
            .collect()
    }

    fn crawler(http: Arc<FakeHttp>, sink: Arc<RecordingSink>, dir: &TempDir) -> DirectoryCrawlProvider {
        let lister = HrefLister::new(http.clone(), HeaderMap::new()).unwrap();
        DirectoryCrawlProvider::new(
            ProviderSettings::new("DWD", 600, 5, dir.path()),
            sink,
            http,
            Arc::new(lister),
            BASE,
        )
        .with_metadata_url(META)
    }

    #[tokio::test]
    async fn test_partial_download_failure_still_archives_survivors() {
        let dir = TempDir::new().unwrap();
        let names = ["a_now.zip", "b_now.zip", "c_now.zip", "d_now.zip"];
        let http = Arc::new(
            FakeHttp::new()
                .respond(BASE, index(&names))
                .respond(META, "stations v1")
                .respond(&format!("{}c_now.zip", BASE), "station c"),
        );
        let sink = Arc::new(RecordingSink::new());
        let mut dwd = crawler(http.clone(), sink.clone(), &dir);

        let outcome = dwd.fetch_job(TimeSlot::floor(1_700_000_400, 600)).await;

        assert!(outcome.is_stored());
        let stored = sink.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].0, "1700000400.zip");

        let mut archive = ZipArchive::new(Cursor::new(stored[0].1.clone())).unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(archive.by_index(0).unwrap().name(), "c_now.zip");

        // Every listed file requested exactly once
        for name in names {
            assert_eq!(http.requests_to(&format!("{}{}", BASE, name)).len(), 1);
        }
    }

    #[tokio::test]
    async fn test_unchanged_metadata_skips_the_tick() {
        let dir = TempDir::new().unwrap();
        let http = Arc::new(
            FakeHttp::new()
                .respond(BASE, index(&["a_now.zip"]))
                .respond(META, "stations v1")
                .respond(&format!("{}a_now.zip", BASE), "station a"),
        );
        let sink = Arc::new(RecordingSink::new());
        let mut dwd = crawler(http.clone(), sink.clone(), &dir);

        assert!(dwd.fetch_job(TimeSlot::floor(1_700_000_400, 600)).await.is_stored());
        assert_eq!(
            dwd.last_checksum(),
            Some(&ChangeChecksum::of(b"stations v1"))
        );
        let downloads_after_first = http.requests_to(&format!("{}a_now.zip", BASE)).len();

        let outcome = dwd.fetch_job(TimeSlot::floor(1_700_001_000, 600)).await;

        assert_eq!(outcome, JobOutcome::Unchanged);
        assert_eq!(sink.stored().len(), 1);
        assert_eq!(
            http.requests_to(&format!("{}a_now.zip", BASE)).len(),
            downloads_after_first
        );
    }

    #[tokio::test]
    async fn test_failed_tick_does_not_commit_checksum() {
        let dir = TempDir::new().unwrap();
        let http = Arc::new(
            FakeHttp::new()
                .respond(BASE, index(&["a_now.zip"]))
                .respond(META, "stations v1"),
        );
        let sink = Arc::new(RecordingSink::new());
        let mut dwd = crawler(http.clone(), sink.clone(), &dir);

        let outcome = dwd.fetch_job(TimeSlot::floor(1_700_000_400, 600)).await;

        assert!(matches!(outcome, JobOutcome::Failed(_)));
        assert!(sink.stored().is_empty());
        assert!(dwd.last_checksum().is_none());
    }

    #[tokio::test]
    async fn test_metadata_outage_downloads_anyway() {
        let dir = TempDir::new().unwrap();
        let http = Arc::new(
            FakeHttp::new()
                .respond(BASE, index(&["a_now.zip"]))
                .respond(&format!("{}a_now.zip", BASE), "station a"),
        );
        let sink = Arc::new(RecordingSink::new());
        let mut dwd = crawler(http.clone(), sink.clone(), &dir);

        assert!(dwd.fetch_job(TimeSlot::floor(1_700_000_400, 600)).await.is_stored());
        assert!(dwd.last_checksum().is_none());
    }

    #[tokio::test]
    async fn test_listing_document_is_archived_first() {
        let dir = TempDir::new().unwrap();
        let listing = index(&["a_now.zip"]);
        let http = Arc::new(
            FakeHttp::new()
                .respond(BASE, listing.clone())
                .respond(&format!("{}a_now.zip", BASE), "station a"),
        );
        let sink = Arc::new(RecordingSink::new());
        let mut dwd = crawler(http, sink.clone(), &dir).with_listing_entry("index.html");

        assert!(dwd.fetch_job(TimeSlot::floor(1_700_000_400, 600)).await.is_stored());

        let stored = sink.stored();
        let mut archive = ZipArchive::new(Cursor::new(stored[0].1.clone())).unwrap();
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.by_index(1).unwrap().name(), "a_now.zip");
        let mut entry = archive.by_index(0).unwrap();
        assert_eq!(entry.name(), "index.html");
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        assert_eq!(content, listing);
    }

    #[tokio::test]
    async fn test_listing_document_alone_is_not_archived() {
        let dir = TempDir::new().unwrap();
        let http = Arc::new(FakeHttp::new().respond(BASE, index(&["a_now.zip"])));
        let sink = Arc::new(RecordingSink::new());
        let mut dwd = crawler(http, sink.clone(), &dir).with_listing_entry("index.html");

        let outcome = dwd.fetch_job(TimeSlot::floor(1_700_000_400, 600)).await;

        assert!(matches!(outcome, JobOutcome::Failed(_)));
        assert!(sink.stored().is_empty());
    }

    #[tokio::test]
    async fn test_scratch_space_is_cleaned_up() {
        let dir = TempDir::new().unwrap();
        let http = Arc::new(
            FakeHttp::new()
                .respond(BASE, index(&["a_now.zip"]))
                .respond(&format!("{}a_now.zip", BASE), "station a"),
        );
        let mut dwd = crawler(http, Arc::new(RecordingSink::new()), &dir);

        dwd.fetch_job(TimeSlot::floor(1_700_000_400, 600)).await;

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
