//! Image transcoder - bounds an image to a maximum dimension and re-encodes it as JPEG
//!
//! Decoding and resampling are CPU bound and run on the blocking thread pool.

use async_trait::async_trait;
use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use std::io::Cursor;
use tracing::debug;

use crate::config::TranscodeSettings;
use crate::pipeline::{Transcode, TranscodeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeConfig {
    /// Longest allowed side in pixels
    pub max_dimension: u32,
    /// JPEG quality (1-100)
    pub quality: u8,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self::from(&TranscodeSettings::default())
    }
}

impl From<&TranscodeSettings> for TranscodeConfig {
    fn from(settings: &TranscodeSettings) -> Self {
        Self {
            max_dimension: settings.max_dimension,
            quality: settings.quality,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Transcoder {
    config: TranscodeConfig,
}

impl Transcoder {
    pub fn new(config: TranscodeConfig) -> Self {
        Self { config }
    }

    /// Blocking transcode; use the [`Transcode`] impl from async code
    pub fn transcode_blocking(&self, raw: &[u8]) -> Result<Bytes, TranscodeError> {
        let img = image::load_from_memory(raw).map_err(|e| TranscodeError::Decode(e.to_string()))?;
        let (width, height) = img.dimensions();

        let max = self.config.max_dimension;
        let img = if width > max || height > max {
            // Fits inside max x max, aspect ratio preserved
            img.resize(max, max, FilterType::Lanczos3)
        } else {
            img
        };

        // JPEG has no alpha channel
        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
        let mut buf = Vec::new();
        rgb.write_to(
            &mut Cursor::new(&mut buf),
            ImageOutputFormat::Jpeg(self.config.quality),
        )
        .map_err(|e| TranscodeError::Encode(e.to_string()))?;

        debug!(
            original_width = width,
            original_height = height,
            width = rgb.width(),
            height = rgb.height(),
            size = buf.len(),
            "Image re-encoded"
        );

        Ok(Bytes::from(buf))
    }
}

#[async_trait]
impl Transcode for Transcoder {
    async fn transcode(&self, raw: Bytes) -> Result<Bytes, TranscodeError> {
        let transcoder = self.clone();
        tokio::task::spawn_blocking(move || transcoder.transcode_blocking(&raw))
            .await
            .map_err(|e| TranscodeError::Worker(e.to_string()))?
    }
}
