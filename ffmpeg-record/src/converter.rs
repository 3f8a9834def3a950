//! RGBA bitmap → planar YUV 4:2:0 frame conversion.
//!
//! Every call owns its intermediate RGBA frame and its scaling context and
//! releases both before returning. The converted frame is handed to the caller.

use ffmpeg_next::format::Pixel;
use ffmpeg_next::frame::Video;

use crate::{
    bitmap::RawBitmap,
    error::{Error, Result},
    frame::CodecFrame,
    scaler::Scaler,
};

pub struct FrameConverter {
    target: Pixel,
}

impl Default for FrameConverter {
    fn default() -> Self {
        Self::new(Pixel::YUV420P)
    }
}

impl FrameConverter {
    pub fn new(target: Pixel) -> Self {
        Self { target }
    }

    pub fn target(&self) -> Pixel {
        self.target
    }

    /// Consumes `bitmap` and returns a frame of the same size in the target format.
    /// The returned frame has no pts; the caller stamps it.
    pub fn convert(&self, bitmap: RawBitmap) -> Result<CodecFrame> {
        let (width, height) = (bitmap.width(), bitmap.height());
        let source = rgba_frame(&bitmap)?;
        drop(bitmap);

        let mut converted = alloc_frame(self.target, width, height)?;
        let mut scaler = Scaler::bilinear(
            Pixel::RGBA,
            width,
            height,
            self.target,
            width,
            height,
        )?;
        scaler.run(&source, &mut converted)?;

        Ok(CodecFrame::from(converted))
    }
}

/// Allocates a frame with its own buffers for `format` at `width`x`height`.
pub(crate) fn alloc_frame(format: Pixel, width: u32, height: u32) -> Result<Video> {
    let mut frame = Video::empty();
    frame.set_format(format);
    frame.set_width(width);
    frame.set_height(height);
    let ret = unsafe { ffmpeg_next::ffi::av_frame_get_buffer(frame.as_mut_ptr(), 0) };
    if ret < 0 {
        return Err(Error::FrameAlloc {
            width,
            height,
            source: ffmpeg_next::Error::from(ret),
        });
    }
    Ok(frame)
}

fn rgba_frame(bitmap: &RawBitmap) -> Result<Video> {
    let mut frame = alloc_frame(Pixel::RGBA, bitmap.width(), bitmap.height())?;
    let ret = unsafe { ffmpeg_next::ffi::av_frame_make_writable(frame.as_mut_ptr()) };
    if ret < 0 {
        return Err(Error::NotWritable(ffmpeg_next::Error::from(ret)));
    }
    copy_rows(bitmap, &mut frame)?;
    Ok(frame)
}

fn copy_rows(bitmap: &RawBitmap, frame: &mut Video) -> Result<()> {
    let row = bitmap.row_bytes();
    let stride = frame.stride(0);
    if stride < row {
        return Err(Error::PixelCopy(format!(
            "frame stride {} smaller than bitmap row {}",
            stride, row
        )));
    }
    let src = bitmap.data();
    let dst = frame.data_mut(0);
    let rows = bitmap.height() as usize;
    if dst.len() < stride * (rows - 1) + row {
        return Err(Error::PixelCopy(format!(
            "frame plane of {} bytes cannot hold {} rows",
            dst.len(),
            rows
        )));
    }
    if stride == row {
        dst[..row * rows].copy_from_slice(&src[..row * rows]);
    } else {
        for (y, line) in src.chunks_exact(row).enumerate() {
            dst[y * stride..y * stride + row].copy_from_slice(line);
        }
    }
    Ok(())
}
