//! Pixel transformations and the chain driver.
//!
//! Transformations compose strictly left-to-right as declared on the
//! request: the output of one is the sole input of the next. Each carries
//! a stable identity key that participates in cache-key derivation and is
//! named in error logs when it fails.
//!
//! Frames move through `apply` by value: a transformation consumes its
//! input and the driver never keeps the pre-transformation buffer, so
//! intermediate pixels are freed as soon as their replacement exists and
//! returning the input unchanged is always safe.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{LoadError, LoadResult};
use crate::request::CacheKey;
use crate::types::{DecodedImage, Frame, SourceKind};

/// Context handed to every transformation invocation.
pub struct TransformContext<'a> {
    /// Identity of the source being loaded
    pub source: &'a str,
    /// Kind of the source (local, network, memory)
    pub source_kind: SourceKind,
    /// Whether the image being transformed is a placeholder
    pub is_placeholder: bool,
    /// The cache key of the load this transformation is part of
    pub cache_key: &'a CacheKey,
}

/// Error type transformations are free to fail with; the driver wraps it
/// into a [`LoadError::Transform`] carrying the transformation's key.
pub type TransformationError = Box<dyn std::error::Error + Send + Sync>;

/// A pluggable pixel transformation.
pub trait Transformation: Send + Sync {
    /// Stable identity key, used in cache keys and error logs.
    fn key(&self) -> &str;

    /// Consume a frame and produce its replacement. Implementations must
    /// not retain the input frame (moves make that the default).
    fn apply(
        &self,
        frame: Frame,
        ctx: &TransformContext<'_>,
    ) -> Result<Frame, TransformationError>;
}

/// Converts a frame to grayscale.
pub struct Grayscale;

impl Transformation for Grayscale {
    fn key(&self) -> &str {
        "grayscale"
    }

    fn apply(
        &self,
        frame: Frame,
        _ctx: &TransformContext<'_>,
    ) -> Result<Frame, TransformationError> {
        Ok(Frame {
            image: frame.image.grayscale(),
            duration: frame.duration,
        })
    }
}

/// Run one frame through the whole chain, checking for cancellation
/// before every step.
fn apply_to_frame(
    mut frame: Frame,
    transformations: &[Arc<dyn Transformation>],
    ctx: &TransformContext<'_>,
    cancel: &CancellationToken,
) -> LoadResult<Frame> {
    for transformation in transformations {
        if cancel.is_cancelled() {
            return Err(LoadError::Cancelled);
        }
        frame = transformation.apply(frame, ctx).map_err(|e| {
            tracing::error!(
                key = transformation.key(),
                source = ctx.source,
                "Transformation failed: {e}"
            );
            LoadError::Transform {
                key: transformation.key().to_string(),
                message: e.to_string(),
            }
        })?;
    }
    if cancel.is_cancelled() {
        return Err(LoadError::Cancelled);
    }
    Ok(frame)
}

/// Apply the ordered chain to a decoded image.
///
/// Still images run the chain once. Animated images run the full chain
/// independently on every frame, keep each frame's original display
/// duration, and reassemble the sequence in original order. Any failure
/// aborts the whole pipeline; intermediate frames are dropped on the way
/// out of this function.
pub(crate) fn apply_chain(
    image: DecodedImage,
    transformations: &[Arc<dyn Transformation>],
    ctx: &TransformContext<'_>,
    cancel: &CancellationToken,
) -> LoadResult<DecodedImage> {
    if transformations.is_empty() {
        return Ok(image);
    }

    let format = image.format().map(str::to_string);
    let (original_w, original_h) = image.original_dimensions();
    let animated = image.is_animated();

    let mut frames = Vec::with_capacity(image.frame_count());
    for frame in image.into_frames() {
        let duration = frame.duration;
        let mut transformed = apply_to_frame(frame, transformations, ctx, cancel)?;
        if animated {
            // Display timing belongs to the animation, not the chain.
            transformed.duration = duration;
        }
        frames.push(transformed);
    }

    Ok(DecodedImage::new(frames, format, original_w, original_h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn ctx_fixture<'a>(key: &'a CacheKey) -> TransformContext<'a> {
        TransformContext {
            source: "bytes:test",
            source_kind: SourceKind::Memory,
            is_placeholder: false,
            cache_key: key,
        }
    }

    fn test_key() -> CacheKey {
        CacheKey::compose("bytes:test", 0, 0, false, &[])
    }

    /// Writes its marker into the red channel of pixel (0, 0) after
    /// shifting the previous value, so application order is observable
    /// in the output pixels.
    struct Marker {
        name: &'static str,
        value: u8,
        log: Arc<Mutex<Vec<&'static str>>>,
        calls: Arc<AtomicU32>,
    }

    impl Transformation for Marker {
        fn key(&self) -> &str {
            self.name
        }

        fn apply(
            &self,
            frame: Frame,
            _ctx: &TransformContext<'_>,
        ) -> Result<Frame, TransformationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.log.lock().unwrap().push(self.name);
            let mut buffer = frame.image.to_rgba8();
            let previous = buffer.get_pixel(0, 0)[0];
            buffer.put_pixel(0, 0, Rgba([previous * 10 + self.value, 0, 0, 255]));
            Ok(Frame {
                image: DynamicImage::ImageRgba8(buffer),
                duration: frame.duration,
            })
        }
    }

    struct Failing;

    impl Transformation for Failing {
        fn key(&self) -> &str {
            "failing"
        }

        fn apply(
            &self,
            _frame: Frame,
            _ctx: &TransformContext<'_>,
        ) -> Result<Frame, TransformationError> {
            Err("synthetic failure".into())
        }
    }

    fn still_image() -> DecodedImage {
        DecodedImage::single(
            Frame::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                4,
                4,
                Rgba([0, 0, 0, 255]),
            ))),
            Some("png".to_string()),
        )
    }

    fn animated_image(frame_count: usize) -> DecodedImage {
        let frames = (0..frame_count)
            .map(|i| {
                Frame::with_duration(
                    DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]))),
                    Duration::from_millis(10 * (i as u64 + 1)),
                )
            })
            .collect();
        DecodedImage::new(frames, Some("gif".to_string()), 4, 4)
    }

    fn marker(
        name: &'static str,
        value: u8,
        log: &Arc<Mutex<Vec<&'static str>>>,
        calls: &Arc<AtomicU32>,
    ) -> Arc<dyn Transformation> {
        Arc::new(Marker {
            name,
            value,
            log: log.clone(),
            calls: calls.clone(),
        })
    }

    #[test]
    fn test_chain_applies_in_declared_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicU32::new(0));
        let chain = vec![
            marker("a", 1, &log, &calls),
            marker("b", 2, &log, &calls),
        ];
        let key = test_key();

        let out = apply_chain(
            still_image(),
            &chain,
            &ctx_fixture(&key),
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
        // b saw a's output: (0*10+1)*10+2 = 12
        assert_eq!(out.primary().image.get_pixel(0, 0)[0], 12);
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let image = still_image();
        let key = test_key();
        let out = apply_chain(image, &[], &ctx_fixture(&key), &CancellationToken::new()).unwrap();
        assert_eq!(out.frame_count(), 1);
    }

    #[test]
    fn test_animated_chain_runs_per_frame_and_keeps_durations() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicU32::new(0));
        let chain = vec![
            marker("a", 1, &log, &calls),
            marker("b", 2, &log, &calls),
        ];
        let key = test_key();

        let out = apply_chain(
            animated_image(3),
            &chain,
            &ctx_fixture(&key),
            &CancellationToken::new(),
        )
        .unwrap();

        // 3 frames x 2 transformations
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(out.frame_count(), 3);
        for (i, frame) in out.frames().iter().enumerate() {
            assert_eq!(
                frame.duration,
                Some(Duration::from_millis(10 * (i as u64 + 1)))
            );
            assert_eq!(frame.image.get_pixel(0, 0)[0], 12);
        }
    }

    #[test]
    fn test_failure_carries_transformation_key() {
        let key = test_key();
        let result = apply_chain(
            still_image(),
            &[Arc::new(Failing) as Arc<dyn Transformation>],
            &ctx_fixture(&key),
            &CancellationToken::new(),
        );
        match result {
            Err(LoadError::Transform { key, message }) => {
                assert_eq!(key, "failing");
                assert!(message.contains("synthetic failure"));
            }
            other => panic!("expected transform error, got {other:?}"),
        }
    }

    #[test]
    fn test_failure_stops_remaining_invocations() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicU32::new(0));
        let chain: Vec<Arc<dyn Transformation>> = vec![
            Arc::new(Failing),
            marker("after", 1, &log, &calls),
        ];
        let key = test_key();

        let result = apply_chain(
            animated_image(3),
            &chain,
            &ctx_fixture(&key),
            &CancellationToken::new(),
        );

        assert!(matches!(result, Err(LoadError::Transform { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancellation_observed_between_steps() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let chain = vec![marker("a", 1, &log, &calls)];
        let key = test_key();

        let result = apply_chain(still_image(), &chain, &ctx_fixture(&key), &cancel);
        assert!(matches!(result, Err(LoadError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_grayscale_key_and_output() {
        let key = test_key();
        let frame = Frame::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            2,
            2,
            Rgba([200, 10, 10, 255]),
        )));
        assert_eq!(Grayscale.key(), "grayscale");
        let out = Grayscale.apply(frame, &ctx_fixture(&key)).unwrap();
        // All channels collapse to one luma value
        let luma = out.image.to_rgba8();
        let px = luma.get_pixel(0, 0);
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }
}
