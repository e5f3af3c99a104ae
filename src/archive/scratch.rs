use crate::error::{CollectorError, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Per-job scratch directory under the provider's download path.
///
/// Sub-requests write distinctly named files here; the directory and
/// everything in it is removed when the value is dropped.
pub struct ScratchDir {
    temp_dir: TempDir,
}

impl ScratchDir {
    pub fn new_in(download_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(download_path)?;
        let temp_dir = tempfile::Builder::new()
            .prefix(".job-")
            .tempdir_in(download_path)
            .map_err(|e| {
                CollectorError::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create scratch directory in {}: {}",
                        download_path.display(),
                        e
                    ),
                ))
            })?;

        Ok(Self { temp_dir })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write `content` to `file_name` inside the scratch directory.
    pub async fn write_file(&self, file_name: &str, content: &[u8]) -> Result<PathBuf> {
        let file_name = sanitize_file_name(file_name)?;
        let dest_path = self.temp_dir.path().join(file_name);
        tokio::fs::write(&dest_path, content).await?;
        Ok(dest_path)
    }
}

/// Keep only the final path segment so a listing entry cannot escape the
/// scratch directory.
pub fn sanitize_file_name(file_name: &str) -> Result<&str> {
    let name = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() || name == "." || name == ".." {
        return Err(CollectorError::InvalidFormat(format!(
            "Unusable file name '{}'",
            file_name
        )));
    }

    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scratch_dir_lifecycle() -> Result<()> {
        let download_path = TempDir::new()?;
        let scratch_path;
        {
            let scratch = ScratchDir::new_in(download_path.path())?;
            scratch_path = scratch.path().to_path_buf();
            assert!(scratch_path.starts_with(download_path.path()));

            let written = scratch.write_file("station_00020.zip", b"payload").await?;
            assert_eq!(std::fs::read(&written)?, b"payload");
        }
        assert!(!scratch_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_scratch_dir_creates_missing_download_path() -> Result<()> {
        let root = TempDir::new()?;
        let nested = root.path().join("a").join("b");

        let scratch = ScratchDir::new_in(&nested)?;
        assert!(scratch.path().exists());
        Ok(())
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("stations.txt").unwrap(), "stations.txt");
        assert_eq!(sanitize_file_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_file_name("dir\\file.csv").unwrap(), "file.csv");
        assert!(sanitize_file_name("subdir/").is_err());
        assert!(sanitize_file_name("..").is_err());
    }
}
