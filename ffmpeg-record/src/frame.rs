use std::fmt::{Display, Formatter};

use ffmpeg_next::format::Pixel;

/// A video frame in a codec-facing pixel format.
///
/// Owns the underlying `AVFrame`; dropping it releases the planes.
pub struct CodecFrame {
    frame: ffmpeg_next::frame::Video,
}

impl From<ffmpeg_next::frame::Video> for CodecFrame {
    fn from(frame: ffmpeg_next::frame::Video) -> Self {
        Self { frame }
    }
}

impl CodecFrame {
    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    pub fn format(&self) -> Pixel {
        self.frame.format()
    }

    pub fn pts(&self) -> Option<i64> {
        self.frame.pts()
    }

    pub fn set_pts(&mut self, pts: i64) {
        self.frame.set_pts(Some(pts));
    }

    pub fn planes(&self) -> usize {
        self.frame.planes()
    }

    pub fn stride(&self, plane: usize) -> usize {
        self.frame.stride(plane)
    }

    pub fn plane(&self, plane: usize) -> &[u8] {
        self.frame.data(plane)
    }

    pub fn as_video(&self) -> &ffmpeg_next::frame::Video {
        &self.frame
    }

    /// Sample at (x, y) of `plane`, accounting for the plane stride.
    pub fn sample(&self, plane: usize, x: usize, y: usize) -> u8 {
        self.plane(plane)[y * self.stride(plane) + x]
    }
}

impl Display for CodecFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "CodecFrame width: {}, height: {}, format: {:?}, pts: {:?}",
            self.width(),
            self.height(),
            self.format(),
            self.pts()
        )
    }
}
