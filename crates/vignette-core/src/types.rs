//! Core data types for the Vignette loading pipeline.
//!
//! A finished load is a [`DecodedImage`]: one frame for still images,
//! several frames with display durations for animated ones. Frames own
//! their pixel buffers; moving a frame is the ownership hand-off the
//! pipeline relies on for cleanup.

use std::time::Duration;

use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};

/// Where a source descriptor points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A file on the local filesystem
    Local,
    /// A remote URL
    Network,
    /// Bytes already held in memory
    Memory,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Local => write!(f, "local"),
            SourceKind::Network => write!(f, "network"),
            SourceKind::Memory => write!(f, "memory"),
        }
    }
}

/// Request priority, carried for the calling layer.
///
/// The core pipeline does not reorder gate admission on priority; a
/// scheduler above it may order submissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// One raster frame: an owned pixel buffer plus an optional display
/// duration (set for frames of animated images).
#[derive(Debug, Clone)]
pub struct Frame {
    /// The decoded pixel buffer
    pub image: DynamicImage,
    /// How long this frame is displayed, for animated images
    pub duration: Option<Duration>,
}

impl Frame {
    /// Create a still frame with no display duration.
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image,
            duration: None,
        }
    }

    /// Create an animated frame with its display duration.
    pub fn with_duration(image: DynamicImage, duration: Duration) -> Self {
        Self {
            image,
            duration: Some(duration),
        }
    }

    /// Frame dimensions in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Approximate buffer size, assuming four bytes per pixel.
    pub fn byte_size(&self) -> usize {
        let (w, h) = self.dimensions();
        (w as usize) * (h as usize) * 4
    }
}

/// The finished artifact of a pipeline run: one or more frames plus the
/// source format and the native (pre-downsample) dimensions.
///
/// Shared between the cache and all consumers as `Arc<DecodedImage>`;
/// consumers that need a mutable copy clone frames on their side.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    frames: Vec<Frame>,
    format: Option<String>,
    original_width: u32,
    original_height: u32,
}

impl DecodedImage {
    /// Assemble a decoded image from its frames.
    ///
    /// `frames` must be non-empty; the decoder contract guarantees at
    /// least one frame for every successful decode.
    pub fn new(
        frames: Vec<Frame>,
        format: Option<String>,
        original_width: u32,
        original_height: u32,
    ) -> Self {
        debug_assert!(!frames.is_empty(), "a decoded image has at least one frame");
        Self {
            frames,
            format,
            original_width,
            original_height,
        }
    }

    /// Convenience constructor for a single still frame.
    pub fn single(frame: Frame, format: Option<String>) -> Self {
        let (w, h) = frame.dimensions();
        Self::new(vec![frame], format, w, h)
    }

    /// All frames, in display order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// The first frame.
    pub fn primary(&self) -> &Frame {
        &self.frames[0]
    }

    /// Whether this image carries more than one frame.
    pub fn is_animated(&self) -> bool {
        self.frames.len() > 1
    }

    /// Number of frames.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Dimensions of the primary frame (post-downsample).
    pub fn dimensions(&self) -> (u32, u32) {
        self.primary().dimensions()
    }

    /// Native dimensions reported by the decoder before downsampling.
    pub fn original_dimensions(&self) -> (u32, u32) {
        (self.original_width, self.original_height)
    }

    /// Source format identifier ("png", "gif", ...) when detected.
    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    /// Approximate total pixel-buffer size across all frames.
    pub fn byte_size(&self) -> usize {
        self.frames.iter().map(Frame::byte_size).sum()
    }

    /// Take ownership of the frames, consuming the image.
    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb_frame(w: u32, h: u32) -> Frame {
        Frame::new(DynamicImage::new_rgb8(w, h))
    }

    #[test]
    fn test_single_frame_is_not_animated() {
        let img = DecodedImage::single(rgb_frame(8, 4), Some("png".to_string()));
        assert!(!img.is_animated());
        assert_eq!(img.frame_count(), 1);
        assert_eq!(img.dimensions(), (8, 4));
        assert_eq!(img.original_dimensions(), (8, 4));
        assert_eq!(img.format(), Some("png"));
    }

    #[test]
    fn test_multi_frame_is_animated() {
        let frames = vec![
            Frame::with_duration(DynamicImage::new_rgba8(2, 2), Duration::from_millis(40)),
            Frame::with_duration(DynamicImage::new_rgba8(2, 2), Duration::from_millis(60)),
        ];
        let img = DecodedImage::new(frames, Some("gif".to_string()), 2, 2);
        assert!(img.is_animated());
        assert_eq!(img.frame_count(), 2);
        assert_eq!(img.frames()[1].duration, Some(Duration::from_millis(60)));
    }

    #[test]
    fn test_byte_size_sums_frames() {
        let frames = vec![rgb_frame(10, 10), rgb_frame(10, 10)];
        let img = DecodedImage::new(frames, None, 10, 10);
        assert_eq!(img.byte_size(), 2 * 10 * 10 * 4);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Low < Priority::Normal);
        assert!(Priority::Normal < Priority::High);
        assert_eq!(Priority::default(), Priority::Normal);
    }
}
