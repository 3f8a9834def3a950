use std::fmt::{Display, Formatter};

use ffmpeg_next::{Rational, codec, format::Pixel};

use crate::clock::VIDEO_TIME_BASE;

/// Fixed parameters of the single video stream, built once at pipeline start.
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    codec_id: codec::Id,
    /// Encoder name override, e.g. "libx264". None = default encoder for `codec_id`.
    encoder_name: Option<String>,
    width: u32,
    height: u32,
    fps: u32,
    time_base: Rational,
    bit_rate: usize,
    global_header: bool,
}

impl StreamDescriptor {
    pub fn h264(width: u32, height: u32, fps: u32, bit_rate: usize) -> Self {
        Self {
            codec_id: codec::Id::H264,
            encoder_name: None,
            width,
            height,
            fps,
            time_base: VIDEO_TIME_BASE,
            bit_rate,
            global_header: false,
        }
    }

    pub fn with_encoder_name(mut self, name: Option<String>) -> Self {
        self.encoder_name = name;
        self
    }

    pub fn with_global_header(mut self, global_header: bool) -> Self {
        self.global_header = global_header;
        self
    }

    pub fn codec_id(&self) -> codec::Id {
        self.codec_id
    }

    pub fn encoder_name(&self) -> Option<&str> {
        self.encoder_name.as_deref()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn frame_rate(&self) -> Rational {
        Rational(self.fps as i32, 1)
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn bit_rate(&self) -> usize {
        self.bit_rate
    }

    pub fn global_header(&self) -> bool {
        self.global_header
    }

    /// Encoders are fed planar YUV 4:2:0.
    pub fn pixel_format(&self) -> Pixel {
        Pixel::YUV420P
    }
}

impl Display for StreamDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} {}x{} @ {}fps, time_base: {}, bit_rate: {}, global_header: {}",
            self.codec_id,
            self.width,
            self.height,
            self.fps,
            self.time_base,
            self.bit_rate,
            self.global_header
        )
    }
}
