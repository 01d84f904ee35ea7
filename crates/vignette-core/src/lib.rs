//! Vignette Core - asynchronous image loading pipeline.
//!
//! Vignette loads images from heterogeneous sources (files, URLs,
//! in-memory bytes), decodes and optionally downsamples them, applies an
//! ordered chain of pixel transformations, caches the finished artifact,
//! and hands it to a consumer — asynchronously, cancellably, and under
//! bounded resource pressure.
//!
//! # Architecture
//!
//! ```text
//! Request → CacheKey → [hit? deliver] → resolve → decode → transform → cache → deliver
//! ```
//!
//! Identical concurrent requests share one pipeline execution: the first
//! becomes the owner, the rest wait and adopt its outcome. The expensive
//! decode and transform phases pass through named concurrency gates, so
//! resource pressure stays bounded no matter how many loads are in
//! flight.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vignette_core::{Config, ImagePipeline, LoadRequest, Grayscale};
//!
//! #[tokio::main]
//! async fn main() -> vignette_core::Result<()> {
//!     let pipeline = ImagePipeline::new(Config::load()?);
//!     let image = pipeline
//!         .load(
//!             LoadRequest::from_url("https://example.com/a.png")
//!                 .downsample(256, 256)
//!                 .transform(Arc::new(Grayscale)),
//!         )
//!         .await?;
//!     println!("{}x{}", image.dimensions().0, image.dimensions().1);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod pipeline;
pub mod request;
pub mod source;
pub mod types;

// Re-exports for convenient access
pub use cache::MemoryCache;
pub use config::Config;
pub use dispatch::{ChannelDispatcher, Delivery, NoopDispatcher, TargetDispatcher};
pub use error::{ConfigError, LoadError, LoadResult, Result, VignetteError};
pub use gate::{ConcurrencyGate, GatePermit, GateSet};
pub use pipeline::{
    DataResolver, DecodeOptions, DefaultResolver, Grayscale, ImageDecoder, ResolvedData,
    StandardDecoder, TaskState, TransformContext, Transformation,
};
pub use request::{CacheKey, LoadRequest};
pub use source::ImageSource;
pub use types::{DecodedImage, Frame, Priority, SourceKind};

use std::sync::Arc;

use pipeline::dedup::DedupRegistry;
use pipeline::loader::LoaderTask;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything the loader tasks of one pipeline instance share.
pub(crate) struct PipelineShared {
    pub(crate) config: Config,
    pub(crate) cache: MemoryCache,
    pub(crate) gates: GateSet,
    pub(crate) registry: DedupRegistry,
    pub(crate) resolver: Arc<dyn DataResolver>,
    pub(crate) decoder: Arc<dyn ImageDecoder>,
}

/// The pipeline context: cache, gates, dedup registry, resolver and
/// decoder, owned together so every instance (and every test) is fully
/// isolated.
///
/// Cloning is cheap and shares the same context.
#[derive(Clone)]
pub struct ImagePipeline {
    shared: Arc<PipelineShared>,
}

impl ImagePipeline {
    /// Create a pipeline with the built-in resolver and decoder.
    pub fn new(config: Config) -> Self {
        let resolver = Arc::new(DefaultResolver::new(&config.http));
        Self::with_components(config, resolver, Arc::new(StandardDecoder))
    }

    /// Create a pipeline with custom resolver and decoder implementations.
    pub fn with_components(
        config: Config,
        resolver: Arc<dyn DataResolver>,
        decoder: Arc<dyn ImageDecoder>,
    ) -> Self {
        tracing::debug!(version = VERSION, "initializing pipeline");
        let cache = MemoryCache::new(config.cache.max_bytes);
        let gates = GateSet::new(config.gates.clone());
        Self {
            shared: Arc::new(PipelineShared {
                config,
                cache,
                gates,
                registry: DedupRegistry::new(),
                resolver,
                decoder,
            }),
        }
    }

    /// The pipeline's configuration.
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// The pipeline's memory cache, for inspection and invalidation.
    pub fn cache(&self) -> &MemoryCache {
        &self.shared.cache
    }

    /// The cache key this pipeline derives for a request.
    pub fn cache_key_for(&self, request: &LoadRequest) -> CacheKey {
        request.cache_key(self.shared.config.decode.allow_upscale)
    }

    /// Load an image and return the finished artifact.
    ///
    /// The artifact is shared: cache entries and concurrent identical
    /// requests hold the same `Arc`.
    pub async fn load(&self, request: LoadRequest) -> LoadResult<Arc<DecodedImage>> {
        LoaderTask::new(self.shared.clone(), request).run(None).await
    }

    /// Load an image and additionally deliver it through `dispatcher`;
    /// the returned future completes only after delivery completed.
    pub async fn load_into(
        &self,
        request: LoadRequest,
        dispatcher: Arc<dyn TargetDispatcher>,
    ) -> LoadResult<Arc<DecodedImage>> {
        LoaderTask::new(self.shared.clone(), request)
            .run(Some(&dispatcher))
            .await
    }
}
