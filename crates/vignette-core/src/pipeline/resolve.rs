//! Data resolvers: turning a source descriptor into raw bytes.
//!
//! The pipeline only depends on the [`DataResolver`] trait. The built-in
//! resolvers cover the three source kinds; [`DefaultResolver`] dispatches
//! between them and is what a pipeline uses unless the caller injects a
//! custom implementation.

use async_trait::async_trait;

use crate::config::HttpConfig;
use crate::error::{LoadError, LoadResult};
use crate::source::ImageSource;

/// The product of resolving a source: raw encoded bytes plus whatever
/// metadata the resolver learned cheaply. The decoder remains the
/// authority for dimensions.
#[derive(Debug, Clone)]
pub struct ResolvedData {
    /// The encoded image bytes
    pub bytes: Vec<u8>,
    /// Format hint ("png", "webp", ...) when the resolver knows it
    pub format: Option<String>,
    /// Native dimensions when the resolver knows them without decoding
    pub dimensions: Option<(u32, u32)>,
}

impl ResolvedData {
    /// Bytes with no further metadata.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            format: None,
            dimensions: None,
        }
    }
}

/// Trait for fetching the bytes behind a source descriptor.
///
/// Uses `async_trait` because native async fn in trait is not object-safe
/// (the pipeline holds an `Arc<dyn DataResolver>`).
#[async_trait]
pub trait DataResolver: Send + Sync {
    /// Resolver name for logging.
    fn name(&self) -> &str;

    /// Fetch the bytes for a source, or fail with a resolve error.
    async fn fetch(&self, source: &ImageSource) -> LoadResult<ResolvedData>;
}

fn resolve_error(source: &ImageSource, message: impl Into<String>) -> LoadError {
    LoadError::Resolve {
        origin: source.identity(),
        message: message.into(),
    }
}

/// Reads local files with `tokio::fs`.
pub struct FileResolver;

#[async_trait]
impl DataResolver for FileResolver {
    fn name(&self) -> &str {
        "file"
    }

    async fn fetch(&self, source: &ImageSource) -> LoadResult<ResolvedData> {
        match source {
            ImageSource::File(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| resolve_error(source, e.to_string()))?;
                Ok(ResolvedData::from_bytes(bytes))
            }
            _ => Err(resolve_error(source, "file resolver needs a file source")),
        }
    }
}

/// Fetches remote URLs with `reqwest`.
pub struct HttpResolver {
    client: reqwest::Client,
}

impl HttpResolver {
    /// Build a resolver with the configured user agent.
    pub fn new(config: &HttpConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client ({e}), using defaults");
                reqwest::Client::new()
            });
        Self { client }
    }

    /// Map an `image/*` content type to a format hint.
    fn format_from_content_type(content_type: &str) -> Option<String> {
        let subtype = content_type
            .split(';')
            .next()?
            .trim()
            .strip_prefix("image/")?;
        match subtype {
            "jpeg" | "jpg" => Some("jpeg".to_string()),
            "png" => Some("png".to_string()),
            "gif" => Some("gif".to_string()),
            "webp" => Some("webp".to_string()),
            "bmp" => Some("bmp".to_string()),
            "tiff" => Some("tiff".to_string()),
            other => Some(other.to_string()),
        }
    }
}

#[async_trait]
impl DataResolver for HttpResolver {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, source: &ImageSource) -> LoadResult<ResolvedData> {
        let url = match source {
            ImageSource::Url(url) => url,
            _ => return Err(resolve_error(source, "http resolver needs a url source")),
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| resolve_error(source, e.to_string()))?
            .error_for_status()
            .map_err(|e| resolve_error(source, e.to_string()))?;

        let format = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::format_from_content_type);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| resolve_error(source, e.to_string()))?;

        Ok(ResolvedData {
            bytes: bytes.to_vec(),
            format,
            dimensions: None,
        })
    }
}

/// Hands back bytes the caller already holds.
pub struct BytesResolver;

#[async_trait]
impl DataResolver for BytesResolver {
    fn name(&self) -> &str {
        "bytes"
    }

    async fn fetch(&self, source: &ImageSource) -> LoadResult<ResolvedData> {
        match source {
            ImageSource::Bytes { data, .. } => {
                if data.is_empty() {
                    return Err(resolve_error(source, "empty byte source"));
                }
                Ok(ResolvedData::from_bytes(data.to_vec()))
            }
            _ => Err(resolve_error(source, "bytes resolver needs a bytes source")),
        }
    }
}

/// Dispatches to the built-in resolver matching the source kind.
pub struct DefaultResolver {
    file: FileResolver,
    http: HttpResolver,
    bytes: BytesResolver,
}

impl DefaultResolver {
    pub fn new(config: &HttpConfig) -> Self {
        Self {
            file: FileResolver,
            http: HttpResolver::new(config),
            bytes: BytesResolver,
        }
    }
}

#[async_trait]
impl DataResolver for DefaultResolver {
    fn name(&self) -> &str {
        "default"
    }

    async fn fetch(&self, source: &ImageSource) -> LoadResult<ResolvedData> {
        match source {
            ImageSource::File(_) => self.file.fetch(source).await,
            ImageSource::Url(_) => self.http.fetch(source).await,
            ImageSource::Bytes { .. } => self.bytes.fetch(source).await,
        }
    }
}
