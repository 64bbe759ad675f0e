//! Image compression: re-encode an oversized raster as JPEG under the image
//! byte budget.
//!
//! The search is a fixed matrix, walked scale-major:
//!
//! ```text
//! scale 1.0 → quality 90, 80, 70, 60, 50
//! scale 0.9 → quality 90, 80, 70, 60, 50
//! …
//! scale 0.6 → quality 90, 80, 70, 60, 50
//! ```
//!
//! The first combination at or under budget wins, so resolution is preferred
//! over encoder quality: OCR accuracy suffers more from lost pixels than from
//! JPEG artefacts at quality 50. The matrix deliberately stops at 0.6. Below
//! that, small print stops being legible, so the caller is told to resize
//! manually instead.

use crate::error::OcrChunkError;
use crate::policy::SizePolicy;
use crate::source::SourceFile;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Linear scale factors tried, largest first.
pub const SCALE_STEPS: [f32; 5] = [1.0, 0.9, 0.8, 0.7, 0.6];

/// JPEG qualities tried at each scale, highest first.
pub const QUALITY_STEPS: [u8; 5] = [90, 80, 70, 60, 50];

/// The winning combination and the file it produced.
#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub file: SourceFile,
    pub scale: f32,
    pub quality: u8,
    /// Output pixel size; `None` when the input was passed through undecoded.
    pub dimensions: Option<(u32, u32)>,
    /// Encodes performed, including the winning one.
    pub attempts: usize,
}

/// Summary of a compression for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionChoice {
    pub scale: f32,
    pub quality: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<(u32, u32)>,
    pub attempts: usize,
}

impl CompressedImage {
    pub fn choice(&self) -> CompressionChoice {
        CompressionChoice {
            scale: self.scale,
            quality: self.quality,
            dimensions: self.dimensions,
            attempts: self.attempts,
        }
    }
}

/// Compress `source` under the image budget, or return it untouched when it
/// already fits.
///
/// CPU-bound; the orchestrator calls this from `spawn_blocking`.
pub fn compress_image(source: &SourceFile, policy: &SizePolicy) -> Result<CompressedImage, OcrChunkError> {
    let budget = policy.max_image_bytes;
    if source.len() <= budget {
        return Ok(CompressedImage {
            file: source.clone(),
            scale: 1.0,
            quality: 100,
            dimensions: None,
            attempts: 0,
        });
    }

    let decoded = image::load_from_memory(source.bytes()).map_err(|e| {
        OcrChunkError::ImageDecodeFailed {
            name: source.name().to_string(),
            detail: e.to_string(),
        }
    })?;

    // JPEG has no alpha channel; flatten once up front.
    let rgb = decoded.to_rgb8();
    let (orig_w, orig_h) = (rgb.width(), rgb.height());
    info!(
        "Compressing '{}' ({} bytes, {}x{}) to fit {} bytes",
        source.name(),
        source.len(),
        orig_w,
        orig_h,
        budget
    );

    let mut attempts = 0;
    let mut smallest = u64::MAX;

    for &scale in &SCALE_STEPS {
        let (w, h) = scaled_dimensions(orig_w, orig_h, scale);
        let scaled = if (w, h) == (orig_w, orig_h) {
            rgb.clone()
        } else {
            imageops::resize(&rgb, w, h, FilterType::Triangle)
        };

        for &quality in &QUALITY_STEPS {
            attempts += 1;
            let encoded = encode_jpeg(&scaled, quality).map_err(|detail| {
                OcrChunkError::ImageEncodeFailed {
                    name: source.name().to_string(),
                    detail,
                }
            })?;
            let size = encoded.len() as u64;
            debug!("scale {:.1} quality {} → {} bytes", scale, quality, size);
            smallest = smallest.min(size);

            if size <= budget {
                info!(
                    "Compressed '{}' to {} bytes at scale {:.1}, quality {} ({} attempts)",
                    source.name(),
                    size,
                    scale,
                    quality,
                    attempts
                );
                return Ok(CompressedImage {
                    file: SourceFile::new(
                        format!("{}.jpg", source.base_name()),
                        "image/jpeg",
                        encoded,
                    ),
                    scale,
                    quality,
                    dimensions: Some((w, h)),
                    attempts,
                });
            }
        }
    }

    Err(OcrChunkError::CompressionExhausted {
        name: source.name().to_string(),
        smallest,
        budget,
    })
}

/// Pixel dimensions at `scale`, never below 1×1.
pub fn scaled_dimensions(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let w = ((width as f64) * scale as f64).round().max(1.0) as u32;
    let h = ((height as f64) * scale as f64).round().max(1.0) as u32;
    (w, h)
}

/// Encode as baseline JPEG at the given quality (1–100).
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode_image(img).map_err(|e| e.to_string())?;
    if buf.is_empty() {
        return Err("encoder produced no output".to_string());
    }
    Ok(buf)
}
