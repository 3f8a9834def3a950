use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use ffmpeg_next::util::log::Level;
use ffmpeg_record::{encoder::EncoderSettings, recorder::RecordSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Source {
    /// Platform screen grabber
    Screen,
    /// Synthetic color bars, no display needed
    Pattern,
}

/// Records the screen to an H.264 MP4 file until Ctrl-C.
#[derive(Parser, Debug)]
#[command(name = "screen-recorder", version)]
pub struct Args {
    /// Output file; the container is picked from the extension
    #[arg(long, default_value = "output.mp4")]
    pub output: PathBuf,

    /// Capture width, defaults to the full screen
    #[arg(long, requires = "height")]
    pub width: Option<u32>,

    /// Capture height, defaults to the full screen
    #[arg(long, requires = "width")]
    pub height: Option<u32>,

    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// Bits per second
    #[arg(long, default_value_t = 4_000_000)]
    pub bitrate: usize,

    /// Monitor index
    #[arg(long, default_value_t = 0)]
    pub display: u32,

    /// Encoder name, e.g. libx264 or libopenh264
    #[arg(long)]
    pub encoder: Option<String>,

    #[arg(long, default_value = "ultrafast")]
    pub preset: String,

    /// Try hardware encoders first
    #[arg(long)]
    pub hwaccel: bool,

    #[arg(long, value_enum, default_value_t = Source::Screen)]
    pub source: Source,

    /// Stop automatically after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// FFmpeg library log level (quiet, error, warning, info, debug, trace)
    #[arg(long, default_value = "error")]
    pub ffmpeg_log: String,
}

impl Args {
    pub fn record_settings(&self) -> anyhow::Result<RecordSettings> {
        let settings = RecordSettings {
            output: self.output.clone(),
            width: self.width,
            height: self.height,
            fps: self.fps,
            bit_rate: self.bitrate,
            display: self.display,
            encoder: self.encoder.clone(),
            encoder_settings: EncoderSettings {
                preset: Some(self.preset.clone()).filter(|p| !p.is_empty()),
                hardware: self.hwaccel,
                ..EncoderSettings::default()
            },
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn ffmpeg_log_level(&self) -> anyhow::Result<Level> {
        parse_ffmpeg_level(&self.ffmpeg_log)
    }
}

fn parse_ffmpeg_level(name: &str) -> anyhow::Result<Level> {
    let level = match name.to_ascii_lowercase().as_str() {
        "quiet" => Level::Quiet,
        "panic" => Level::Panic,
        "fatal" => Level::Fatal,
        "error" => Level::Error,
        "warning" | "warn" => Level::Warning,
        "info" => Level::Info,
        "verbose" => Level::Verbose,
        "debug" => Level::Debug,
        "trace" => Level::Trace,
        other => anyhow::bail!("unknown ffmpeg log level: {}", other),
    };
    Ok(level)
}
