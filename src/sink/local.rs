use crate::archive::scratch::sanitize_file_name;
use crate::error::Result;
use crate::sink::Sink;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

/// Stores artifacts as files under a root directory.
///
/// Bytes go to a hidden sibling first and are renamed into place, so a
/// reader never sees a half-written artifact.
#[derive(Debug, Clone)]
pub struct LocalSink {
    root: PathBuf,
}

impl LocalSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Sink for LocalSink {
    async fn store(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let file_name = sanitize_file_name(key)?;
        tokio::fs::create_dir_all(&self.root).await?;

        let final_path = self.root.join(file_name);
        let partial_path = self.root.join(format!(".{}.partial", file_name));

        tokio::fs::write(&partial_path, &bytes).await?;
        tokio::fs::rename(&partial_path, &final_path).await?;

        info!(path = %final_path.display(), bytes = bytes.len(), "Stored artifact");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }
}
