//! Source descriptors: where the bytes of an image come from.

use std::path::PathBuf;
use std::sync::Arc;

use crate::types::SourceKind;

/// A source descriptor for a load request.
///
/// The descriptor's identity string participates in cache-key derivation,
/// so two descriptors with equal identity are treated as the same image.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// A file on the local filesystem
    File(PathBuf),
    /// A remote URL (http/https)
    Url(String),
    /// Bytes already in memory, tagged with a caller-chosen name
    Bytes {
        /// Stable name standing in for a path; part of the cache key
        name: String,
        /// The raw encoded image bytes
        data: Arc<[u8]>,
    },
}

impl ImageSource {
    /// Create a file source.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        ImageSource::File(path.into())
    }

    /// Create a URL source.
    pub fn url(url: impl Into<String>) -> Self {
        ImageSource::Url(url.into())
    }

    /// Create an in-memory source. The name must be stable for the data:
    /// it is the source's identity for caching and deduplication.
    pub fn bytes(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        ImageSource::Bytes {
            name: name.into(),
            data: data.into(),
        }
    }

    /// The stable identity of this source, used in cache keys and logs.
    pub fn identity(&self) -> String {
        match self {
            ImageSource::File(path) => path.display().to_string(),
            ImageSource::Url(url) => url.clone(),
            ImageSource::Bytes { name, .. } => format!("bytes:{name}"),
        }
    }

    /// The kind of this source.
    pub fn kind(&self) -> SourceKind {
        match self {
            ImageSource::File(_) => SourceKind::Local,
            ImageSource::Url(_) => SourceKind::Network,
            ImageSource::Bytes { .. } => SourceKind::Memory,
        }
    }
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.identity())
    }
}
