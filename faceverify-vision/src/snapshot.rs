use std::path::Path;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Encodes frames to base64 JPEG, reusing one output buffer across calls.
pub struct SnapshotEncoder {
    quality: u8,
    jpeg: Vec<u8>,
}

impl Default for SnapshotEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl SnapshotEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            jpeg: Vec::new(),
        }
    }

    /// JPEG bytes of `frame`, valid until the next call.
    pub fn encode_jpeg(&mut self, frame: &RgbImage) -> Result<&[u8]> {
        self.jpeg.clear();
        let encoder = JpegEncoder::new_with_quality(&mut self.jpeg, self.quality);
        frame
            .write_with_encoder(encoder)
            .context("encoding snapshot as JPEG")?;
        Ok(&self.jpeg)
    }

    /// Raw base64 payload of `frame` as JPEG, without any `data:` prefix.
    pub fn encode_base64(&mut self, frame: &RgbImage) -> Result<String> {
        let jpeg = self.encode_jpeg(frame)?;
        Ok(STANDARD.encode(jpeg))
    }
}

/// Load an image file and flatten it to RGB.
pub fn load_rgb(path: &Path) -> Result<RgbImage> {
    let img = image::open(path).with_context(|| format!("opening image {}", path.display()))?;
    Ok(img.to_rgb8())
}
