use std::fmt::{Display, Formatter};
use std::time::Instant;

use bytes::Bytes;

use crate::error::{Error, Result};

/// Bytes per packed RGBA pixel.
pub const RGBA_BYTES_PER_PIXEL: usize = 4;

/// Rectangle of the screen that a capture source samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn sized(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }
}

impl Display for CaptureRegion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}+{},{}", self.width, self.height, self.x, self.y)
    }
}

/// One captured screen image, tightly packed RGBA rows.
pub struct RawBitmap {
    width: u32,
    height: u32,
    data: Bytes,
    captured_at: Instant,
}

impl RawBitmap {
    pub fn new(width: u32, height: u32, data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        let expected = width as usize * height as usize * RGBA_BYTES_PER_PIXEL;
        if width == 0 || height == 0 {
            return Err(Error::PixelCopy(format!(
                "invalid bitmap size {}x{}",
                width, height
            )));
        }
        if data.len() != expected {
            return Err(Error::PixelCopy(format!(
                "bitmap {}x{} expects {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
            captured_at: Instant::now(),
        })
    }

    /// Bitmap filled with a single RGBA color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self> {
        let pixels = width as usize * height as usize;
        let data: Vec<u8> = rgba.iter().copied().cycle().take(pixels * 4).collect();
        Self::new(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn row_bytes(&self) -> usize {
        self.width as usize * RGBA_BYTES_PER_PIXEL
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}

impl Display for RawBitmap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RawBitmap {}x{} ({} bytes)",
            self.width,
            self.height,
            self.data.len()
        )
    }
}
