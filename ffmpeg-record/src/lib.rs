/// Registers FFmpeg components (formats, devices, codecs). Call once at startup
/// before opening a capture device or an output file.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

pub mod av_log;
pub mod bitmap;
pub mod capture;
pub mod clock;
pub mod converter;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod hw;
pub mod output;
pub mod packet;
pub mod recorder;
pub mod sampler;
pub mod scaler;
pub mod stream;

pub use error::{Error, Result};
