pub mod bundle;
pub mod scratch;

pub use bundle::{bundle_files, gunzip, untar_gz, zip_directory};
pub use scratch::ScratchDir;

use crate::utils::constants::{EXT_JSON, EXT_XML, EXT_ZIP};
use serde::{Deserialize, Serialize};

/// Format of the artifact a provider hands to its sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    Zip,
    Xml,
    Json,
}

impl ArtifactKind {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            EXT_ZIP => Some(ArtifactKind::Zip),
            EXT_XML => Some(ArtifactKind::Xml),
            EXT_JSON => Some(ArtifactKind::Json),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Zip => EXT_ZIP,
            ArtifactKind::Xml => EXT_XML,
            ArtifactKind::Json => EXT_JSON,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactKind::Zip => "application/zip",
            ArtifactKind::Xml => "application/xml",
            ArtifactKind::Json => "application/json",
        }
    }

    /// Content type for a storage key, falling back to raw bytes.
    pub fn content_type_for_key(key: &str) -> &'static str {
        key.rsplit_once('.')
            .and_then(|(_, ext)| Self::from_extension(ext))
            .map(|kind| kind.content_type())
            .unwrap_or("application/octet-stream")
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}
