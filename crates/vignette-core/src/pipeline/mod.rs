//! The loading pipeline and its stages.
//!
//! - **resolve**: fetch the bytes behind a source descriptor
//! - **decode**: turn bytes into raster frames, downsampling as requested
//! - **transform**: run the ordered transformation chain
//! - **dedup**: share one execution among identical concurrent requests
//! - **loader**: the per-request state machine tying the stages together

pub mod decode;
pub mod resolve;
pub mod transform;

pub(crate) mod dedup;
pub(crate) mod loader;

// Re-exports for convenient access
pub use decode::{DecodeOptions, ImageDecoder, StandardDecoder};
pub use loader::TaskState;
pub use resolve::{
    BytesResolver, DataResolver, DefaultResolver, FileResolver, HttpResolver, ResolvedData,
};
pub use transform::{Grayscale, TransformContext, Transformation, TransformationError};
