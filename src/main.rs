use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ffmpeg_record::{
    capture::{DeviceCapture, Pattern, PatternCapture, ScreenCapture},
    recorder::{Recorder, RecordingSummary},
};
use tokio_util::sync::CancellationToken;

mod config;

use config::{Args, Source};

const PATTERN_SIZE: (u32, u32) = (1280, 720);

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("ffmpeg_record", log::LevelFilter::Info)
        .filter_module("ffmpeg", log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

/// Cancels `cancel` on Ctrl-C or once `duration` elapsed.
fn spawn_stop_signal(cancel: CancellationToken, duration: Option<Duration>) {
    tokio::spawn(async move {
        let deadline = async {
            match duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = cancel.cancelled() => {},
            _ = tokio::signal::ctrl_c() => {
                log::info!("ctrl-c received, stopping");
                cancel.cancel();
            },
            _ = deadline => {
                log::info!("duration elapsed, stopping");
                cancel.cancel();
            },
        }
    });
}

async fn record(args: Args) -> anyhow::Result<RecordingSummary> {
    let settings = args.record_settings()?;
    ffmpeg_record::init()?;
    ffmpeg_next::util::log::set_level(args.ffmpeg_log_level()?);
    ffmpeg_record::av_log::forward_to_log();

    let capture: Box<dyn ScreenCapture> = match args.source {
        Source::Screen => Box::new(
            DeviceCapture::open(settings.display, settings.size(), settings.fps)
                .with_context(|| format!("open screen capture on display {}", settings.display))?,
        ),
        Source::Pattern => {
            let (width, height) = settings.size().unwrap_or(PATTERN_SIZE);
            Box::new(PatternCapture::new(width, height, Pattern::Bars))
        }
    };

    let recorder = Recorder::open(&settings, capture.region())
        .with_context(|| format!("set up recording to {}", settings.output.display()))?;

    let cancel = CancellationToken::new();
    spawn_stop_signal(cancel.clone(), args.duration.map(Duration::from_secs));

    log::info!(
        "recording {} to {}, press ctrl-c to stop",
        capture.region(),
        settings.output.display()
    );
    recorder.run(capture, cancel).await
}

#[tokio::main]
async fn main() {
    init_logging();
    let args = Args::parse();

    let code = match record(args).await {
        Ok(summary) if summary.stop_reason.is_failed() => {
            log::error!("recording failed: {}", summary);
            1
        }
        Ok(summary) => {
            log::info!("recording saved: {}", summary);
            0
        }
        Err(e) => {
            log::error!("{:#}", e);
            1
        }
    };

    std::process::exit(code);
}
