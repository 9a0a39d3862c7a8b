//! Image compression and thumbnails backed by the `image` crate.
//!
//! Decoding and encoding are CPU-bound, so both run on the blocking pool.

use crate::upload::{
    CodecError, CompressionOptions, ImageCompressor, MediaFile, OutputFormat, ThumbnailRenderer,
};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{imageops::FilterType, DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// Lowest JPEG quality tried while shrinking towards the size target.
const MIN_JPEG_QUALITY: u8 = 30;
const QUALITY_STEP: u8 = 10;

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCodec;

impl ImageCodec {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ImageCompressor for ImageCodec {
    async fn compress(
        &self,
        file: &MediaFile,
        options: &CompressionOptions,
    ) -> Result<MediaFile, CodecError> {
        let file = file.clone();
        let options = options.clone();
        tokio::task::spawn_blocking(move || compress_blocking(&file, &options))
            .await
            .map_err(|e| CodecError::Worker(format!("Task join error: {}", e)))?
    }
}

#[async_trait]
impl ThumbnailRenderer for ImageCodec {
    async fn make_thumbnail(
        &self,
        file: &MediaFile,
        width: u32,
        height: u32,
        format: OutputFormat,
        quality: f32,
    ) -> Result<Vec<u8>, CodecError> {
        if width == 0 || height == 0 {
            return Err(CodecError::Unsupported(format!(
                "thumbnail size {}x{}",
                width, height
            )));
        }
        let data = file.data.clone();
        tokio::task::spawn_blocking(move || {
            let img = image::load_from_memory(&data)?;
            let thumbnail = img.resize_to_fill(width, height, FilterType::Lanczos3);
            encode(&thumbnail, format, quality_to_u8(quality))
        })
        .await
        .map_err(|e| CodecError::Worker(format!("Task join error: {}", e)))?
    }
}

fn compress_blocking(
    file: &MediaFile,
    options: &CompressionOptions,
) -> Result<MediaFile, CodecError> {
    let img = image::load_from_memory(&file.data)?;
    let img = fit_within(img, options.max_dimension_px);
    let target_bytes = (options.max_size_mb.max(0.0) * 1024.0 * 1024.0) as usize;

    let data = match options.format {
        OutputFormat::Jpeg => {
            let mut quality = quality_to_u8(options.quality);
            loop {
                let encoded = encode(&img, OutputFormat::Jpeg, quality)?;
                if encoded.len() <= target_bytes || quality <= MIN_JPEG_QUALITY {
                    debug!(
                        quality,
                        bytes = encoded.len(),
                        target_bytes,
                        "Encoded JPEG"
                    );
                    break encoded;
                }
                quality = quality.saturating_sub(QUALITY_STEP).max(MIN_JPEG_QUALITY);
            }
        }
        OutputFormat::Png => encode(&img, OutputFormat::Png, 100)?,
    };

    Ok(MediaFile::new(
        file.renamed_with_extension(options.format.extension()),
        options.format.mime_type(),
        data,
    ))
}

/// Scales down, keeping aspect ratio, so neither side exceeds `max_dimension`.
fn fit_within(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    if max_dimension == 0 || (img.width() <= max_dimension && img.height() <= max_dimension) {
        return img;
    }
    img.resize(max_dimension, max_dimension, FilterType::Lanczos3)
}

fn encode(img: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = img.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
            encoder.encode_image(&rgb)?;
        }
        OutputFormat::Png => {
            img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
        }
    }
    Ok(out)
}

fn quality_to_u8(quality: f32) -> u8 {
    let scaled = (quality.clamp(0.0, 1.0) * 100.0).round() as u8;
    scaled.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};

    fn noisy_png(width: u32, height: u32) -> MediaFile {
        let mut seed: u32 = 0x1234_5678;
        let img = RgbImage::from_fn(width, height, |x, y| {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let noise = (seed >> 24) as u8;
            Rgb([(x % 256) as u8 ^ noise, (y % 256) as u8, noise])
        });
        let mut data = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
            .unwrap();
        MediaFile::new("slide.png", "image/png", data)
    }

    #[test]
    fn test_quality_to_u8() {
        assert_eq!(quality_to_u8(0.8), 80);
        assert_eq!(quality_to_u8(1.5), 100);
        assert_eq!(quality_to_u8(0.0), 1);
    }

    #[tokio::test]
    async fn test_compress_fits_max_dimension() {
        let file = noisy_png(400, 200);
        let options = CompressionOptions {
            max_size_mb: 1.0,
            max_dimension_px: 100,
            quality: 0.8,
            format: OutputFormat::Jpeg,
        };

        let compressed = ImageCodec::new().compress(&file, &options).await.unwrap();
        assert_eq!(compressed.name, "slide.jpg");
        assert_eq!(compressed.mime_type, "image/jpeg");

        let decoded = image::load_from_memory(&compressed.data).unwrap();
        assert_eq!(decoded.dimensions(), (100, 50));
    }

    #[tokio::test]
    async fn test_compress_keeps_small_images_unscaled() {
        let file = noisy_png(64, 48);
        let options = CompressionOptions {
            format: OutputFormat::Png,
            ..CompressionOptions::default()
        };

        let compressed = ImageCodec::new().compress(&file, &options).await.unwrap();
        assert_eq!(compressed.mime_type, "image/png");
        let decoded = image::load_from_memory(&compressed.data).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
    }

    #[tokio::test]
    async fn test_compress_steps_quality_down_for_size_target() {
        let file = noisy_png(300, 300);
        let codec = ImageCodec::new();
        let generous = CompressionOptions {
            max_size_mb: 10.0,
            max_dimension_px: 1920,
            quality: 0.95,
            format: OutputFormat::Jpeg,
        };
        let tight = CompressionOptions {
            max_size_mb: 0.000_1,
            ..generous.clone()
        };

        let large = codec.compress(&file, &generous).await.unwrap();
        let small = codec.compress(&file, &tight).await.unwrap();
        assert!(small.len() < large.len());
        assert!(!small.is_empty());
    }

    #[tokio::test]
    async fn test_thumbnail_exact_size() {
        let file = noisy_png(320, 100);
        let bytes = ImageCodec::new()
            .make_thumbnail(&file, 40, 30, OutputFormat::Jpeg, 0.7)
            .await
            .unwrap();

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (40, 30));
    }

    #[tokio::test]
    async fn test_invalid_input_is_codec_error() {
        let file = MediaFile::new("broken.jpg", "image/jpeg", b"not an image".to_vec());
        let codec = ImageCodec::new();

        let err = codec
            .compress(&file, &CompressionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CodecError::Image(_)));

        let err = codec
            .make_thumbnail(&file, 0, 10, OutputFormat::Png, 0.7)
            .await
            .unwrap_err();
        assert!(matches!(err, CodecError::Unsupported(_)));
    }
}
