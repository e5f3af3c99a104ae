//! In-memory collaborators for provider tests.

use crate::error::Result;
use crate::http::HttpGet;
use crate::sink::Sink;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Serves canned bodies by exact URL or URL prefix; anything else is absent.
#[derive(Default)]
pub struct FakeHttp {
    exact: HashMap<String, Bytes>,
    prefixed: Vec<(String, Bytes)>,
    latency: Option<Duration>,
    requests: Mutex<Vec<String>>,
    headers: Mutex<Vec<HeaderMap>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, url: &str, body: impl Into<Bytes>) -> Self {
        self.exact.insert(url.to_string(), body.into());
        self
    }

    pub fn respond_prefix(mut self, prefix: &str, body: impl Into<Bytes>) -> Self {
        self.prefixed.push((prefix.to_string(), body.into()));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, prefix: &str) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|url| url.starts_with(prefix))
            .collect()
    }

    /// Headers of every request, in request order.
    pub fn headers_sent(&self) -> Vec<HeaderMap> {
        self.headers.lock().unwrap().clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpGet for FakeHttp {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Option<Bytes> {
        self.requests.lock().unwrap().push(url.to_string());
        self.headers.lock().unwrap().push(headers.clone());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.exact.get(url).cloned().or_else(|| {
            self.prefixed
                .iter()
                .find(|(prefix, _)| url.starts_with(prefix.as_str()))
                .map(|(_, body)| body.clone())
        })
    }
}

/// Keeps every stored artifact in memory.
#[derive(Default)]
pub struct RecordingSink {
    stored: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(&self) -> Vec<(String, Vec<u8>)> {
        self.stored.lock().unwrap().clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.stored().into_iter().map(|(key, _)| key).collect()
    }
}

#[async_trait]
impl Sink for RecordingSink {
    async fn store(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.stored.lock().unwrap().push((key.to_string(), bytes));
        Ok(())
    }

    fn describe(&self) -> String {
        "memory://recording".to_string()
    }
}
