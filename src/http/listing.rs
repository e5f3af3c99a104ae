use crate::error::{CollectorError, Result};
use crate::http::HttpGet;
use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use reqwest::header::HeaderMap;
use reqwest::Url;
use serde_json::Value;
use std::sync::Arc;

/// A downloadable file discovered by a [`FileLister`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Name the file gets inside the archive.
    pub name: String,
    pub url: String,
}

/// Files found at a listing URL, with the listing document they came from.
#[derive(Debug, Clone)]
pub struct Listing {
    pub files: Vec<RemoteFile>,
    pub body: Bytes,
}

/// "List the files available at URL" capability.
#[async_trait]
pub trait FileLister: Send + Sync {
    async fn list(&self, url: &str) -> Result<Listing>;
}

async fn fetch_listing(http: &dyn HttpGet, url: &str, headers: &HeaderMap) -> Result<Bytes> {
    http.get(url, headers)
        .await
        .ok_or_else(|| CollectorError::MissingData(format!("Failed to access listing at {}", url)))
}

/// Lists files linked from an HTML directory index.
pub struct HrefLister {
    http: Arc<dyn HttpGet>,
    headers: HeaderMap,
    pattern: Regex,
}

impl HrefLister {
    pub fn new(http: Arc<dyn HttpGet>, headers: HeaderMap) -> Result<Self> {
        let pattern = Regex::new(r#"href="([^"]*)""#)
            .map_err(|e| CollectorError::Config(format!("Invalid listing pattern: {}", e)))?;
        Ok(Self {
            http,
            headers,
            pattern,
        })
    }

    /// File links in `html`. Only plain file names count: sort links and
    /// anything with a path separator are skipped.
    pub fn parse(&self, base_url: &str, html: &str) -> Result<Vec<RemoteFile>> {
        let base = Url::parse(base_url)
            .map_err(|e| CollectorError::InvalidFormat(format!("Bad base URL {}: {}", base_url, e)))?;

        let mut files: Vec<RemoteFile> = Vec::new();
        for capture in self.pattern.captures_iter(html) {
            let href = &capture[1];
            if href.is_empty() || href.starts_with('?') || href.contains('/') {
                continue;
            }
            if files.iter().any(|file| file.name == href) {
                continue;
            }

            let url = base.join(href).map_err(|e| {
                CollectorError::InvalidFormat(format!("Bad link {} in {}: {}", href, base_url, e))
            })?;
            files.push(RemoteFile {
                name: href.to_string(),
                url: url.to_string(),
            });
        }

        Ok(files)
    }
}

#[async_trait]
impl FileLister for HrefLister {
    async fn list(&self, url: &str) -> Result<Listing> {
        let body = fetch_listing(self.http.as_ref(), url, &self.headers).await?;
        let files = self.parse(url, &String::from_utf8_lossy(&body))?;
        Ok(Listing { files, body })
    }
}

/// Lists one asset per feature of a STAC item collection, chosen by
/// name suffix and stored as `{feature id}{suffix}`.
pub struct StacAssetLister {
    http: Arc<dyn HttpGet>,
    headers: HeaderMap,
    asset_suffix: String,
}

impl StacAssetLister {
    pub fn new(http: Arc<dyn HttpGet>, headers: HeaderMap, asset_suffix: impl Into<String>) -> Self {
        Self {
            http,
            headers,
            asset_suffix: asset_suffix.into(),
        }
    }

    pub fn parse(&self, collection: &Value) -> Vec<RemoteFile> {
        let features = collection
            .get("features")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        features
            .iter()
            .filter_map(|feature| {
                let Some(id) = feature.get("id").and_then(Value::as_str) else {
                    tracing::warn!("STAC feature without id");
                    return None;
                };
                let href = feature
                    .get("assets")
                    .and_then(Value::as_object)
                    .and_then(|assets| {
                        assets
                            .iter()
                            .find(|(name, _)| name.ends_with(&self.asset_suffix))
                    })
                    .and_then(|(_, asset)| asset.get("href"))
                    .and_then(Value::as_str);

                match href {
                    Some(href) => Some(RemoteFile {
                        name: format!("{}{}", id, self.asset_suffix),
                        url: href.to_string(),
                    }),
                    None => {
                        tracing::warn!(station = id, suffix = %self.asset_suffix, "No matching asset");
                        None
                    }
                }
            })
            .collect()
    }
}

#[async_trait]
impl FileLister for StacAssetLister {
    async fn list(&self, url: &str) -> Result<Listing> {
        let body = fetch_listing(self.http.as_ref(), url, &self.headers).await?;
        let collection: Value = serde_json::from_slice(&body)?;
        let files = self.parse(&collection);
        tracing::info!(%url, files = files.len(), "Parsed STAC collection");
        Ok(Listing { files, body })
    }
}
