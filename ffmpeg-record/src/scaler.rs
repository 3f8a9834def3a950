use ffmpeg_next::{format::Pixel, software::scaling};

use crate::error::{Error, Result};

/// Owned swscale context converting between two fixed geometries.
pub struct Scaler {
    context: scaling::Context,
}

impl Scaler {
    pub fn bilinear(
        src_format: Pixel,
        src_width: u32,
        src_height: u32,
        dst_format: Pixel,
        dst_width: u32,
        dst_height: u32,
    ) -> Result<Self> {
        let context = scaling::Context::get(
            src_format,
            src_width,
            src_height,
            dst_format,
            dst_width,
            dst_height,
            scaling::Flags::BILINEAR,
        )
        .map_err(Error::ScalerContext)?;
        Ok(Self { context })
    }

    pub fn run(
        &mut self,
        frame: &ffmpeg_next::frame::Video,
        dst: &mut ffmpeg_next::frame::Video,
    ) -> Result<()> {
        self.context.run(frame, dst).map_err(Error::Scale)
    }
}

unsafe impl Send for Scaler {}
