//! Image decoding with format detection, animation support, and
//! aspect-preserving downsampling.
//!
//! Decoding is CPU-bound and synchronous; the loader task runs it inside
//! `spawn_blocking` while holding a decode gate permit.

use std::io::Cursor;
use std::time::Duration;

use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage, GenericImageView, ImageFormat};

use crate::error::{LoadError, LoadResult};
use crate::gate::AUXILIARY_GATE;
use crate::types::{DecodedImage, Frame};

/// Size constraints for a decode. Zero means unconstrained on that axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    pub max_width: u32,
    pub max_height: u32,
    pub allow_upscale: bool,
}

/// Trait for turning encoded bytes into raster frames.
pub trait ImageDecoder: Send + Sync {
    /// Decode `bytes`, downsampling to the requested maximum dimensions.
    ///
    /// `source` is the source identity, used only in error messages.
    fn decode(&self, bytes: &[u8], source: &str, options: &DecodeOptions)
        -> LoadResult<DecodedImage>;

    /// Name of an additional gate that must be held while decoding these
    /// bytes, for codecs that are not reentrant. `None` for most input.
    fn auxiliary_gate(&self, _bytes: &[u8]) -> Option<&'static str> {
        None
    }
}

/// Compute the downsample target for an image, or `None` when the image
/// should keep its native size.
///
/// The target fits within the constrained axes, preserves aspect ratio
/// (each axis is the true scale rounded to the nearest pixel), and never
/// enlarges unless `allow_upscale` is set.
pub fn target_dimensions(
    width: u32,
    height: u32,
    options: &DecodeOptions,
) -> Option<(u32, u32)> {
    if width == 0 || height == 0 {
        return None;
    }
    if options.max_width == 0 && options.max_height == 0 {
        return None;
    }

    let scale_w = if options.max_width == 0 {
        f64::INFINITY
    } else {
        options.max_width as f64 / width as f64
    };
    let scale_h = if options.max_height == 0 {
        f64::INFINITY
    } else {
        options.max_height as f64 / height as f64
    };
    let scale = scale_w.min(scale_h);

    if scale == 1.0 || (scale > 1.0 && !options.allow_upscale) {
        return None;
    }

    let target_w = ((width as f64 * scale).round() as u32).max(1);
    let target_h = ((height as f64 * scale).round() as u32).max(1);
    Some((
        if options.max_width > 0 {
            target_w.min(options.max_width)
        } else {
            target_w
        },
        if options.max_height > 0 {
            target_h.min(options.max_height)
        } else {
            target_h
        },
    ))
}

fn downsample(image: DynamicImage, options: &DecodeOptions) -> DynamicImage {
    let (width, height) = image.dimensions();
    match target_dimensions(width, height, options) {
        Some((w, h)) => image.resize_exact(w, h, FilterType::Triangle),
        None => image,
    }
}

/// The built-in decoder, backed by the `image` crate.
///
/// Handles the common still formats plus animated GIF, where every frame
/// is decoded with its display delay and downsampled individually.
pub struct StandardDecoder;

impl StandardDecoder {
    fn decode_error(source: &str, message: impl Into<String>) -> LoadError {
        LoadError::Decode {
            origin: source.to_string(),
            message: message.into(),
        }
    }

    fn decode_animated(
        bytes: &[u8],
        source: &str,
        options: &DecodeOptions,
    ) -> LoadResult<DecodedImage> {
        let decoder = image::codecs::gif::GifDecoder::new(Cursor::new(bytes))
            .map_err(|e| Self::decode_error(source, e.to_string()))?;
        let raw_frames = decoder
            .into_frames()
            .collect_frames()
            .map_err(|e| Self::decode_error(source, e.to_string()))?;
        if raw_frames.is_empty() {
            return Err(Self::decode_error(source, "animation has no frames"));
        }

        let mut original = (0, 0);
        let mut frames = Vec::with_capacity(raw_frames.len());
        for raw in raw_frames {
            let duration = Duration::from(raw.delay());
            let image = DynamicImage::ImageRgba8(raw.into_buffer());
            if original == (0, 0) {
                original = image.dimensions();
            }
            frames.push(Frame::with_duration(downsample(image, options), duration));
        }

        Ok(DecodedImage::new(
            frames,
            Some("gif".to_string()),
            original.0,
            original.1,
        ))
    }
}

impl ImageDecoder for StandardDecoder {
    fn decode(
        &self,
        bytes: &[u8],
        source: &str,
        options: &DecodeOptions,
    ) -> LoadResult<DecodedImage> {
        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| Self::decode_error(source, format!("cannot sniff format: {e}")))?;
        let format = reader.format();

        if format == Some(ImageFormat::Gif) {
            return Self::decode_animated(bytes, source, options);
        }

        let image = reader
            .decode()
            .map_err(|e| Self::decode_error(source, e.to_string()))?;
        let (width, height) = image.dimensions();

        Ok(DecodedImage::new(
            vec![Frame::new(downsample(image, options))],
            format.map(format_to_string),
            width,
            height,
        ))
    }

    fn auxiliary_gate(&self, bytes: &[u8]) -> Option<&'static str> {
        // The WebP codec path is serialized like a non-reentrant native
        // codec would be.
        if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(AUXILIARY_GATE)
        } else {
            None
        }
    }
}

/// Convert an ImageFormat to a string representation.
pub fn format_to_string(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "jpeg".to_string(),
        ImageFormat::Png => "png".to_string(),
        ImageFormat::WebP => "webp".to_string(),
        ImageFormat::Gif => "gif".to_string(),
        ImageFormat::Tiff => "tiff".to_string(),
        ImageFormat::Bmp => "bmp".to_string(),
        ImageFormat::Ico => "ico".to_string(),
        ImageFormat::Avif => "avif".to_string(),
        _ => "unknown".to_string(),
    }
}
