//! Compression detected from a log file's name.

use core::fmt;
use std::path::Path;

/// How a log file is encoded on disk.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Compression {
    /// Plain bytes.
    None,
    /// gzip (`.gz`, `.gzip`), possibly multi-member.
    Gzip,
    /// Zstandard (`.zst`).
    Zstd,
}

impl Compression {
    /// Detects the encoding from the path suffix.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("gz" | "gzip") => Self::Gzip,
            Some("zst") => Self::Zstd,
            _ => Self::None,
        }
    }

    /// Returns the canonical display name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
        }
    }

    /// Whether this build can decode the encoding.
    #[must_use]
    pub const fn is_supported(self) -> bool {
        match self {
            Self::None | Self::Gzip => true,
            Self::Zstd => cfg!(feature = "zstd"),
        }
    }

    /// Only plain files support seeking to the end for `tail`.
    #[must_use]
    pub const fn is_seekable(self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffixes_select_decoder() {
        assert_eq!(Compression::from_path(Path::new("/var/log/a.log.gz")), Compression::Gzip);
        assert_eq!(Compression::from_path(Path::new("a.gzip")), Compression::Gzip);
        assert_eq!(Compression::from_path(Path::new("a.log.zst")), Compression::Zstd);
        assert_eq!(Compression::from_path(Path::new("a.log")), Compression::None);
        assert_eq!(Compression::from_path(Path::new("gz")), Compression::None);
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn zstd_supported_when_feature_enabled() {
        assert!(Compression::Zstd.is_supported());
    }

    #[cfg(not(feature = "zstd"))]
    #[test]
    fn zstd_unsupported_when_feature_disabled() {
        assert!(!Compression::Zstd.is_supported());
    }
}
