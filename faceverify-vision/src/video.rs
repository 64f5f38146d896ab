use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, RgbImage};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

use crate::source::FrameSource;

/// Upper bound on the resolution requested from the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraints {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            max_width: 400,
            max_height: 300,
        }
    }
}

impl Constraints {
    /// Largest size that fits inside the bounds while keeping the aspect ratio.
    pub fn fit(&self, width: u32, height: u32) -> (u32, u32) {
        if width <= self.max_width && height <= self.max_height {
            return (width, height);
        }
        if width == 0 || height == 0 {
            return (width.min(self.max_width), height.min(self.max_height));
        }
        let scale = f64::min(
            self.max_width as f64 / width as f64,
            self.max_height as f64 / height as f64,
        );
        let w = ((width as f64 * scale).floor() as u32).max(1);
        let h = ((height as f64 * scale).floor() as u32).max(1);
        (w, h)
    }
}

pub struct Camera {
    stream: Stream<'static>,
    width: u32,
    height: u32,
    fourcc: FourCC,
    constraints: Constraints,
}

impl Camera {
    pub fn open(device: &str, constraints: Constraints) -> Result<Self> {
        let dev = Device::with_path(device).context("open camera")?;
        let mut fmt = dev.format().context("get format")?;
        let (width, height) = constraints.fit(fmt.width, fmt.height);
        // Prefer RGB, fallback to YUYV, else accept existing format
        let desired = Format::new(width, height, FourCC::new(b"RGB3"));
        fmt = dev.set_format(&desired).unwrap_or(fmt);
        if fmt.fourcc != FourCC::new(b"RGB3") {
            let yuyv = Format::new(width, height, FourCC::new(b"YUYV"));
            fmt = dev.set_format(&yuyv).unwrap_or(fmt);
        }
        log::info!(
            "camera {} negotiated {}x{} {:?} (bounds {}x{})",
            device,
            fmt.width,
            fmt.height,
            fmt.fourcc,
            constraints.max_width,
            constraints.max_height
        );
        let stream = Stream::with_buffers(&dev, Type::VideoCapture, 4).context("stream")?;
        Ok(Self {
            stream,
            width: fmt.width,
            height: fmt.height,
            fourcc: fmt.fourcc,
            constraints,
        })
    }

    pub fn frame(&mut self) -> Result<RgbImage> {
        let (data, meta) = self.stream.next().context("capture frame")?;
        log::debug!(
            "captured frame: width={} height={} fourcc={:?} seq={:?} len={}",
            self.width,
            self.height,
            self.fourcc,
            meta.sequence,
            data.len()
        );
        let buf = decode_pixels(self.fourcc, self.width, self.height, data)?;
        let img: RgbImage = ImageBuffer::from_raw(self.width, self.height, buf)
            .ok_or_else(|| anyhow::anyhow!("failed to build image buffer"))?;

        // Some drivers ignore the requested size
        let (w, h) = self.constraints.fit(self.width, self.height);
        if (w, h) != (self.width, self.height) {
            return Ok(imageops::resize(&img, w, h, FilterType::Triangle));
        }
        Ok(img)
    }
}

impl FrameSource for Camera {
    fn dimensions(&self) -> (u32, u32) {
        self.constraints.fit(self.width, self.height)
    }

    fn frame(&mut self) -> Result<RgbImage> {
        Camera::frame(self)
    }
}

/// Convert a raw capture buffer to packed RGB, truncated to exactly one frame.
pub fn decode_pixels(fourcc: FourCC, width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let mut buf = match fourcc {
        f if f == FourCC::new(b"RGB3") => data.to_vec(),
        f if f == FourCC::new(b"YUYV") => yuyv_to_rgb(width, height, data)?,
        f if f == FourCC::new(b"GREY") => grey_to_rgb(width, height, data)?,
        other => {
            log::warn!(
                "unexpected pixel format {:?}, passing through raw len={}",
                other,
                data.len()
            );
            data.to_vec()
        }
    };
    let expected = (width * height * 3) as usize;
    if buf.len() < expected {
        log::error!(
            "buffer too small: got {}, expected {} (fourcc {:?})",
            buf.len(),
            expected,
            fourcc
        );
        return Err(anyhow::anyhow!("buffer too small"));
    } else if buf.len() > expected {
        log::warn!(
            "buffer larger than expected ({} > {}), truncating",
            buf.len(),
            expected
        );
        buf.truncate(expected);
    }
    Ok(buf)
}

fn yuyv_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let expected = (width * height * 2) as usize;
    if data.len() < expected {
        return Err(anyhow::anyhow!("short YUYV buffer"));
    }
    let mut out = Vec::with_capacity((width * height * 3) as usize);
    for chunk in data[..expected].chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;
        for &y in &[y0, y1] {
            let r = y + 1.402 * v;
            let g = y - 0.344136 * u - 0.714136 * v;
            let b = y + 1.772 * u;
            out.push(clamp(r));
            out.push(clamp(g));
            out.push(clamp(b));
        }
    }
    Ok(out)
}

fn clamp(v: f32) -> u8 {
    v.clamp(0.0, 255.0) as u8
}

fn grey_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let expected = (width * height) as usize;
    if data.len() < expected {
        return Err(anyhow::anyhow!("short GREY buffer"));
    }
    let mut out = Vec::with_capacity(expected * 3);
    for &y in data.iter().take(expected) {
        out.extend_from_slice(&[y, y, y]);
    }
    Ok(out)
}
