use std::path::Path;

use anyhow::Result;
use image::RgbImage;

use crate::video::{Camera, Constraints};

/// A live stream of frames, bound once and read every capture cycle.
pub trait FrameSource {
    /// Dimensions of the frames this source yields.
    fn dimensions(&self) -> (u32, u32);

    fn frame(&mut self) -> Result<RgbImage>;
}

/// Platform camera access.
pub trait CaptureBackend {
    /// Whether video capture works at all in this environment.
    fn is_supported(&self) -> bool;

    /// Whether `target` names a device this backend can open.
    fn resolve(&self, target: &str) -> bool;

    fn acquire(&self, target: &str, constraints: Constraints) -> Result<Box<dyn FrameSource>>;
}

/// Video4Linux devices such as `/dev/video0`.
#[derive(Debug, Default, Clone, Copy)]
pub struct V4lBackend;

impl CaptureBackend for V4lBackend {
    fn is_supported(&self) -> bool {
        cfg!(target_os = "linux")
    }

    fn resolve(&self, target: &str) -> bool {
        !target.is_empty() && Path::new(target).exists()
    }

    fn acquire(&self, target: &str, constraints: Constraints) -> Result<Box<dyn FrameSource>> {
        let camera = Camera::open(target, constraints)?;
        Ok(Box::new(camera))
    }
}

/// A fixed image served as every frame.
pub struct StillFrame {
    image: RgbImage,
}

impl StillFrame {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }
}

impl FrameSource for StillFrame {
    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn frame(&mut self) -> Result<RgbImage> {
        Ok(self.image.clone())
    }
}
