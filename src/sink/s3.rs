use crate::archive::ArtifactKind;
use crate::error::{CollectorError, Result};
use crate::sink::Sink;
use crate::utils::constants::SCHEME_S3;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::info;

/// Stores artifacts as objects under `s3://bucket/prefix`.
///
/// The object key is the prefix followed directly by the artifact key, so a
/// prefix meant as a folder should end with `/`.
#[derive(Debug, Clone)]
pub struct S3Sink {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Sink {
    /// Credentials and region come from the standard AWS environment chain.
    pub async fn from_uri(uri: &str) -> Result<Self> {
        let (bucket, prefix) = parse_s3_uri(uri)?;
        let config = aws_config::load_from_env().await;

        Ok(Self {
            client: Client::new(&config),
            bucket,
            prefix,
        })
    }

    pub fn object_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

/// Split `s3://bucket/some/prefix/` into `("bucket", "some/prefix/")`.
pub fn parse_s3_uri(uri: &str) -> Result<(String, String)> {
    let rest = uri
        .strip_prefix(SCHEME_S3)
        .ok_or_else(|| CollectorError::UnsupportedStorageUri(uri.to_string()))?;

    let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
    if bucket.is_empty() {
        return Err(CollectorError::Config(format!("S3 URI without bucket: {}", uri)));
    }

    Ok((bucket.to_string(), prefix.to_string()))
}

#[async_trait]
impl Sink for S3Sink {
    async fn store(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let object_key = self.object_key(key);
        let size = bytes.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .content_type(ArtifactKind::content_type_for_key(key))
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| {
                CollectorError::Storage(format!(
                    "Upload of s3://{}/{} failed: {}",
                    self.bucket,
                    object_key,
                    aws_sdk_s3::error::DisplayErrorContext(&e)
                ))
            })?;

        info!(bucket = %self.bucket, key = %object_key, bytes = size, "Uploaded artifact");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }
}
