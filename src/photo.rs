//! Dish photo ingestion: size gate, decode, crop, downscale, JPEG re-encode.

use base64::Engine as _;
use image::{ColorType, DynamicImage, GenericImageView, codecs::jpeg::JpegEncoder, imageops::FilterType};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::{config::MenuConfig, dish::PLACEHOLDER_IMAGE};

const MIB: u64 = 1024 * 1024;

/// Upload ceiling profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadProfile {
    /// 5 MiB ceiling.
    #[default]
    Desktop,
    /// 3 MiB ceiling for constrained devices.
    Mobile,
}

impl UploadProfile {
    /// Largest accepted upload in bytes.
    pub fn max_upload_bytes(self) -> u64 {
        match self {
            Self::Desktop => 5 * MIB,
            Self::Mobile => 3 * MIB,
        }
    }
}

/// Crop rectangle in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

impl CropRegion {
    /// Whole-image region.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// Clamps the region into a `bounds_w × bounds_h` image and shrinks it,
    /// anchored at its top-left corner, to `aspect_ratio` (width / height).
    ///
    /// A non-positive or non-finite ratio leaves the shape alone.
    pub fn constrained(self, aspect_ratio: f32, bounds_w: u32, bounds_h: u32) -> Self {
        let x = self.x.min(bounds_w.saturating_sub(1));
        let y = self.y.min(bounds_h.saturating_sub(1));
        let mut width = self.width.clamp(1, (bounds_w - x).max(1));
        let mut height = self.height.clamp(1, (bounds_h - y).max(1));

        if aspect_ratio.is_finite() && aspect_ratio > 0.0 {
            let ratio = f64::from(aspect_ratio);
            if f64::from(width) / f64::from(height) > ratio {
                width = ((f64::from(height) * ratio).round() as u32).max(1);
            } else {
                height = ((f64::from(width) / ratio).round() as u32).max(1);
            }
        }

        Self { x, y, width, height }
    }
}

/// User decision at the end of the crop step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropDecision {
    /// Keep the given region.
    Confirm(CropRegion),
    /// Dismissed; the dish keeps its current image.
    Cancel,
}

/// Output shape of an ingested photo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeSettings {
    /// Width / height ratio enforced on the crop.
    pub aspect_ratio: f32,
    /// Longest edge of the result.
    pub max_dimension: u32,
    /// JPEG quality on a 0–1 scale.
    pub quality: f32,
}

impl EncodeSettings {
    fn jpeg_quality(&self) -> u8 {
        let q = if self.quality.is_finite() { self.quality.clamp(0.0, 1.0) } else { 0.8 };
        ((q * 100.0).round() as u8).max(1)
    }
}

/// Self-contained encoded image (`data:` URL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImagePayload(String);

impl ImagePayload {
    /// The built-in placeholder.
    pub fn placeholder() -> Self {
        Self(PLACEHOLDER_IMAGE.to_string())
    }

    /// JPEG bytes as a base64 data URL.
    pub fn from_jpeg(bytes: &[u8]) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self(format!("data:image/jpeg;base64,{encoded}"))
    }

    /// Payload text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Payload text, owned.
    pub fn into_string(self) -> String {
        self.0
    }
}

/// Photo rejected; the dish keeps its previous image.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Upload exceeds the profile ceiling.
    #[error("image is {size} bytes, limit is {limit}")]
    TooLarge {
        /// Reported upload size.
        size: u64,
        /// Active ceiling.
        limit: u64,
    },
    /// Bytes are not a decodable image.
    #[error("image could not be read: {0}")]
    ReadFailure(#[source] image::ImageError),
    /// Cropped image could not be re-encoded.
    #[error("image could not be encoded: {0}")]
    EncodeFailure(#[source] image::ImageError),
}

/// Turns raw uploads into bounded JPEG payloads.
#[derive(Debug, Clone)]
pub struct ImageIngestPipeline {
    max_upload_bytes: u64,
    settings: EncodeSettings,
}

impl ImageIngestPipeline {
    /// Pipeline with an explicit ceiling and output shape.
    pub fn new(profile: UploadProfile, settings: EncodeSettings) -> Self {
        Self {
            max_upload_bytes: profile.max_upload_bytes(),
            settings,
        }
    }

    /// Pipeline configured from the session config.
    pub fn from_config(config: &MenuConfig) -> Self {
        Self::new(
            config.upload_profile,
            EncodeSettings {
                aspect_ratio: config.crop_aspect_ratio,
                max_dimension: config.max_image_dimension,
                quality: config.image_quality,
            },
        )
    }

    /// Largest accepted upload in bytes.
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Default output shape.
    pub fn settings(&self) -> EncodeSettings {
        self.settings
    }

    /// Validates and decodes an upload before the crop step is shown.
    pub fn open(&self, raw: &[u8], size_bytes: u64) -> Result<DynamicImage, IngestError> {
        if size_bytes > self.max_upload_bytes {
            warn!(size_bytes, limit = self.max_upload_bytes, "image upload too large");
            return Err(IngestError::TooLarge {
                size: size_bytes,
                limit: self.max_upload_bytes,
            });
        }
        image::load_from_memory(raw).map_err(|err| {
            warn!(error = %err, "image upload unreadable");
            IngestError::ReadFailure(err)
        })
    }

    /// One-shot ingest with the default output shape.
    ///
    /// `Ok(None)` means the crop was cancelled.
    pub fn ingest(
        &self,
        raw: &[u8],
        size_bytes: u64,
        decision: CropDecision,
    ) -> Result<Option<ImagePayload>, IngestError> {
        self.ingest_with(raw, size_bytes, decision, &self.settings)
    }

    /// One-shot ingest with an explicit output shape.
    pub fn ingest_with(
        &self,
        raw: &[u8],
        size_bytes: u64,
        decision: CropDecision,
        settings: &EncodeSettings,
    ) -> Result<Option<ImagePayload>, IngestError> {
        let decoded = self.open(raw, size_bytes)?;
        finish(&decoded, decision, settings)
    }

    /// Ingest that suspends on the crop step until the user decides.
    ///
    /// Size and decode checks run before waiting. A dropped sender counts as
    /// a cancel.
    pub async fn ingest_interactive(
        &self,
        raw: &[u8],
        size_bytes: u64,
        decision: oneshot::Receiver<CropDecision>,
    ) -> Result<Option<ImagePayload>, IngestError> {
        let decoded = self.open(raw, size_bytes)?;
        let decision = decision.await.unwrap_or(CropDecision::Cancel);
        finish(&decoded, decision, &self.settings)
    }
}

fn finish(
    decoded: &DynamicImage,
    decision: CropDecision,
    settings: &EncodeSettings,
) -> Result<Option<ImagePayload>, IngestError> {
    let CropDecision::Confirm(region) = decision else {
        debug!("crop cancelled");
        return Ok(None);
    };
    let bytes = crop_resize_encode(decoded, region, settings).map_err(IngestError::EncodeFailure)?;
    debug!(encoded_bytes = bytes.len(), "image ingested");
    Ok(Some(ImagePayload::from_jpeg(&bytes)))
}

fn crop_resize_encode(
    decoded: &DynamicImage,
    region: CropRegion,
    settings: &EncodeSettings,
) -> image::ImageResult<Vec<u8>> {
    let (src_w, src_h) = decoded.dimensions();
    let region = region.constrained(settings.aspect_ratio, src_w, src_h);
    let cropped = decoded.crop_imm(region.x, region.y, region.width, region.height);

    let (target_w, target_h) = calculate_target_size(region.width, region.height, settings.max_dimension);
    let resized = if (target_w, target_h) == (region.width, region.height) {
        cropped
    } else {
        cropped.resize_exact(target_w, target_h, FilterType::Triangle)
    };

    let rgb = resized.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, settings.jpeg_quality());
    encoder.encode(rgb.as_raw(), width, height, ColorType::Rgb8.into())?;
    Ok(out)
}

fn calculate_target_size(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let max_edge = max_edge.max(1);
    if width <= max_edge && height <= max_edge {
        return (width, height);
    }

    if width >= height {
        let scaled_height = ((height as f64) * (max_edge as f64) / (width as f64)).round() as u32;
        (max_edge, scaled_height.max(1))
    } else {
        let scaled_width = ((width as f64) * (max_edge as f64) / (height as f64)).round() as u32;
        (scaled_width.max(1), max_edge)
    }
}
