pub mod local;
pub mod s3;

pub use local::LocalSink;
pub use s3::S3Sink;

use crate::error::{CollectorError, Result};
use crate::utils::constants::{SCHEME_FILE, SCHEME_S3};
use async_trait::async_trait;
use std::sync::Arc;

/// Durable "store bytes at key" capability.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn store(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Human readable destination, for logs.
    fn describe(&self) -> String;
}

/// Build a sink from a `file://` or `s3://` URI.
pub async fn sink_from_uri(uri: &str) -> Result<Arc<dyn Sink>> {
    if let Some(path) = uri.strip_prefix(SCHEME_FILE) {
        Ok(Arc::new(LocalSink::new(path)))
    } else if uri.starts_with(SCHEME_S3) {
        Ok(Arc::new(S3Sink::from_uri(uri).await?))
    } else {
        Err(CollectorError::UnsupportedStorageUri(uri.to_string()))
    }
}
