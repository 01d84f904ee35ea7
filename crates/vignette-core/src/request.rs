//! Load requests and cache-key derivation.
//!
//! A [`LoadRequest`] is built with a consuming fluent API and is immutable
//! once handed to the pipeline. Its cache key combines everything that
//! changes the pipeline's output: source identity, size constraints, the
//! upscale flag, and the exact ordered transformation chain.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::pipeline::transform::Transformation;
use crate::source::ImageSource;
use crate::types::Priority;

/// Deterministic identity of a pipeline output.
///
/// Two requests with equal keys are interchangeable: they share one
/// pipeline execution and one cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Compose a key from the request tuple.
    pub(crate) fn compose(
        identity: &str,
        max_width: u32,
        max_height: u32,
        allow_upscale: bool,
        transformation_keys: &[&str],
    ) -> Self {
        let mut key = format!("{identity};{max_width}x{max_height};up={allow_upscale}");
        if !transformation_keys.is_empty() {
            key.push(';');
            key.push_str(&transformation_keys.join("+"));
        }
        CacheKey(key)
    }

    /// The raw key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single image load request.
///
/// Built fluently and immutable after construction:
///
/// ```rust,ignore
/// let request = LoadRequest::from_url("https://example.com/a.png")
///     .downsample(256, 256)
///     .transform(Arc::new(Grayscale))
///     .priority(Priority::High);
/// ```
pub struct LoadRequest {
    pub(crate) source: ImageSource,
    pub(crate) max_width: u32,
    pub(crate) max_height: u32,
    pub(crate) allow_upscale: Option<bool>,
    pub(crate) transformations: Vec<Arc<dyn Transformation>>,
    pub(crate) priority: Priority,
    pub(crate) is_placeholder: bool,
    pub(crate) cancellation: CancellationToken,
}

impl LoadRequest {
    /// Start a request for the given source.
    pub fn new(source: ImageSource) -> Self {
        Self {
            source,
            max_width: 0,
            max_height: 0,
            allow_upscale: None,
            transformations: Vec::new(),
            priority: Priority::default(),
            is_placeholder: false,
            cancellation: CancellationToken::new(),
        }
    }

    /// Start a request for a local file.
    pub fn from_file(path: impl Into<std::path::PathBuf>) -> Self {
        Self::new(ImageSource::file(path))
    }

    /// Start a request for a URL.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self::new(ImageSource::url(url))
    }

    /// Start a request for in-memory bytes.
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self::new(ImageSource::bytes(name, data))
    }

    /// Bound decoded dimensions to at most `width` x `height` pixels,
    /// preserving aspect ratio. Zero means unconstrained on that axis.
    pub fn downsample(mut self, width: u32, height: u32) -> Self {
        self.max_width = width;
        self.max_height = height;
        self
    }

    /// Override the configured default for enlarging beyond native size.
    pub fn allow_upscale(mut self, allow: bool) -> Self {
        self.allow_upscale = Some(allow);
        self
    }

    /// Append a transformation to the chain. Transformations are applied
    /// strictly in the order they were added.
    pub fn transform(mut self, transformation: Arc<dyn Transformation>) -> Self {
        self.transformations.push(transformation);
        self
    }

    /// Replace the transformation chain.
    pub fn transformations(mut self, transformations: Vec<Arc<dyn Transformation>>) -> Self {
        self.transformations = transformations;
        self
    }

    /// Set the request priority (informational; gates stay FIFO).
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Mark this load as a placeholder; the flag is passed through to
    /// transformations.
    pub fn placeholder(mut self, is_placeholder: bool) -> Self {
        self.is_placeholder = is_placeholder;
        self
    }

    /// Use the given cancellation token. The caller keeps a clone and
    /// cancels it to abort the load at the next checkpoint.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// The request's source descriptor.
    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    /// A clone of the request's cancellation token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Derive the cache key, falling back to `default_allow_upscale` when
    /// the request did not set the flag itself.
    pub(crate) fn cache_key(&self, default_allow_upscale: bool) -> CacheKey {
        let keys: Vec<&str> = self.transformations.iter().map(|t| t.key()).collect();
        CacheKey::compose(
            &self.source.identity(),
            self.max_width,
            self.max_height,
            self.allow_upscale.unwrap_or(default_allow_upscale),
            &keys,
        )
    }

    pub(crate) fn effective_allow_upscale(&self, default_allow_upscale: bool) -> bool {
        self.allow_upscale.unwrap_or(default_allow_upscale)
    }
}

impl std::fmt::Debug for LoadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadRequest")
            .field("source", &self.source)
            .field("max_width", &self.max_width)
            .field("max_height", &self.max_height)
            .field("allow_upscale", &self.allow_upscale)
            .field(
                "transformations",
                &self
                    .transformations
                    .iter()
                    .map(|t| t.key())
                    .collect::<Vec<_>>(),
            )
            .field("priority", &self.priority)
            .field("is_placeholder", &self.is_placeholder)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::transform::TransformContext;
    use crate::types::Frame;

    struct Named(&'static str);

    impl Transformation for Named {
        fn key(&self) -> &str {
            self.0
        }

        fn apply(
            &self,
            frame: Frame,
            _ctx: &TransformContext<'_>,
        ) -> Result<Frame, Box<dyn std::error::Error + Send + Sync>> {
            Ok(frame)
        }
    }

    #[test]
    fn test_identical_requests_share_a_key() {
        let a = LoadRequest::from_url("https://example.com/a.png")
            .downsample(100, 50)
            .transform(Arc::new(Named("x")));
        let b = LoadRequest::from_url("https://example.com/a.png")
            .downsample(100, 50)
            .transform(Arc::new(Named("x")));
        assert_eq!(a.cache_key(false), b.cache_key(false));
    }

    #[test]
    fn test_key_depends_on_dimensions() {
        let a = LoadRequest::from_url("https://example.com/a.png").downsample(100, 50);
        let b = LoadRequest::from_url("https://example.com/a.png").downsample(50, 100);
        assert_ne!(a.cache_key(false), b.cache_key(false));
    }

    #[test]
    fn test_key_depends_on_transformation_order() {
        let a = LoadRequest::from_url("https://example.com/a.png")
            .transform(Arc::new(Named("x")))
            .transform(Arc::new(Named("y")));
        let b = LoadRequest::from_url("https://example.com/a.png")
            .transform(Arc::new(Named("y")))
            .transform(Arc::new(Named("x")));
        assert_ne!(a.cache_key(false), b.cache_key(false));
    }

    #[test]
    fn test_key_uses_configured_upscale_default() {
        let request = LoadRequest::from_url("https://example.com/a.png");
        assert_ne!(request.cache_key(false), request.cache_key(true));

        let pinned = LoadRequest::from_url("https://example.com/a.png").allow_upscale(true);
        assert_eq!(pinned.cache_key(false), pinned.cache_key(true));
    }

    #[test]
    fn test_key_format_is_stable() {
        let request = LoadRequest::from_url("https://example.com/a.png")
            .downsample(64, 32)
            .transform(Arc::new(Named("grayscale")))
            .transform(Arc::new(Named("blur")));
        assert_eq!(
            request.cache_key(false).as_str(),
            "https://example.com/a.png;64x32;up=false;grayscale+blur"
        );
    }
}
