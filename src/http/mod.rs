pub mod listing;

pub use listing::{FileLister, HrefLister, Listing, RemoteFile, StacAssetLister};

use crate::error::Result;
use crate::utils::constants::{DEFAULT_RETRY_BACKOFF_SECS, DEFAULT_RETRY_COUNT, DEFAULT_TIMEOUT_SECS};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{error, info, warn};

/// "GET this URL" capability. Returns the body of a 200 response, or `None`
/// once the implementation has given up. Never fails otherwise.
#[async_trait]
pub trait HttpGet: Send + Sync {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Option<Bytes>;
}

/// Retry policy applied to every request of an [`HttpClient`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_COUNT,
            backoff: Duration::from_secs(DEFAULT_RETRY_BACKOFF_SECS),
        }
    }
}

/// Retrying GET over one shared connection pool.
///
/// Cloning is cheap and reuses the pool, so one client can serve every
/// sub-request of a job.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl HttpClient {
    /// Client whose requests carry a total `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client))
    }

    /// Reuse an already established client (session).
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    async fn attempt(&self, url: &str, headers: &HeaderMap) -> std::result::Result<Bytes, String> {
        let response = self
            .client
            .get(url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(format!("HTTP {}", status));
        }

        response.bytes().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl HttpGet for HttpClient {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Option<Bytes> {
        let attempts = self.retry.attempts;

        for attempt in 1..=attempts {
            match self.attempt(url, headers).await {
                Ok(body) => return Some(body),
                Err(reason) if attempt == attempts => {
                    error!(%url, attempts, %reason, "Giving up on download");
                }
                Err(reason) => {
                    warn!(%url, attempt, %reason, "Download attempt failed");
                    info!(
                        %url,
                        backoff_secs = self.retry.backoff.as_secs_f64(),
                        "Waiting before retrying download"
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                }
            }
        }

        None
    }
}

/// One-off retrying GET with a fresh client and the default timeout.
pub async fn get(url: &str, headers: &HeaderMap, retry_count: u32) -> Option<Bytes> {
    let client = match HttpClient::new(Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS)) {
        Ok(client) => client,
        Err(e) => {
            error!(%url, error = %e, "Failed to build HTTP client");
            return None;
        }
    };

    client
        .with_retry(RetryPolicy {
            attempts: retry_count,
            ..RetryPolicy::default()
        })
        .get(url, headers)
        .await
}
