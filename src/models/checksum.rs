use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 digest of an upstream metadata resource, used to skip downloads
/// when nothing changed since the previous tick.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeChecksum(String);

impl ChangeChecksum {
    pub fn of(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight hex digits, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for ChangeChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_sha256_hex() {
        let checksum = ChangeChecksum::of(b"abc");
        assert_eq!(
            checksum.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(checksum.short(), "ba7816bf");
    }

    #[test]
    fn test_checksum_detects_change() {
        assert_eq!(ChangeChecksum::of(b"stations v1"), ChangeChecksum::of(b"stations v1"));
        assert_ne!(ChangeChecksum::of(b"stations v1"), ChangeChecksum::of(b"stations v2"));
    }
}
