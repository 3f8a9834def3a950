use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use anyhow::Context;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    bitmap::{CaptureRegion, RawBitmap},
    capture::ScreenCapture,
    clock::PipelineClock,
    converter::FrameConverter,
    encoder::{Drain, EncoderSession, EncoderSettings, VideoEncoder},
    error::Error,
    output::{Muxer, PacketWriter},
    sampler::ScreenSampler,
    stream::StreamDescriptor,
};

/// Upper bound on receive calls after end of stream before giving up on the encoder.
pub const MAX_FLUSH_POLLS: usize = 1024;

pub const MAX_FPS: u32 = 90_000;

#[derive(Debug, Clone)]
pub struct RecordSettings {
    pub output: PathBuf,
    /// Capture size, None = full screen.
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: u32,
    /// Bits per second.
    pub bit_rate: usize,
    /// Monitor index.
    pub display: u32,
    /// Encoder name override, e.g. "libx264".
    pub encoder: Option<String>,
    pub encoder_settings: EncoderSettings,
}

impl Default for RecordSettings {
    fn default() -> Self {
        Self {
            output: PathBuf::from("output.mp4"),
            width: None,
            height: None,
            fps: 30,
            bit_rate: 4_000_000,
            display: 0,
            encoder: None,
            encoder_settings: EncoderSettings::default(),
        }
    }
}

impl RecordSettings {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (1..=MAX_FPS).contains(&self.fps),
            "fps must be in 1..={}, got {}",
            MAX_FPS,
            self.fps
        );
        anyhow::ensure!(self.bit_rate > 0, "bit rate must be positive");
        for (name, value) in [("width", self.width), ("height", self.height)] {
            if let Some(value) = value {
                anyhow::ensure!(
                    value > 0 && value % 2 == 0,
                    "{} must be even and non-zero, got {}",
                    name,
                    value
                );
            }
        }
        anyhow::ensure!(
            self.width.is_some() == self.height.is_some(),
            "width and height must be given together"
        );
        Ok(())
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.width.zip(self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Configuring,
    Running,
    Stopping,
    Flushing,
    Finalized,
}

#[derive(Debug)]
pub enum StopReason {
    /// The cancellation token fired.
    Cancelled,
    /// The producer ended without error.
    SourceClosed,
    Failed(anyhow::Error),
}

impl StopReason {
    pub fn is_failed(&self) -> bool {
        matches!(self, StopReason::Failed(_))
    }
}

#[derive(Debug)]
pub struct RecordingSummary {
    pub frames_submitted: u64,
    pub packets_written: u64,
    pub last_pts: Option<i64>,
    pub stop_reason: StopReason,
}

impl Display for RecordingSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "frames: {}, packets: {}, last pts: {:?}, stop: ",
            self.frames_submitted, self.packets_written, self.last_pts
        )?;
        match &self.stop_reason {
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::SourceClosed => write!(f, "source closed"),
            StopReason::Failed(e) => write!(f, "failed: {:#}", e),
        }
    }
}

/// Drives capture → convert → encode → mux and owns the stop/flush protocol.
pub struct Recorder<E, W> {
    encoder: E,
    writer: W,
    converter: FrameConverter,
    clock: PipelineClock,
    fps: u32,
    state: RecorderState,
    frames_submitted: u64,
    packets_written: u64,
    last_pts: Option<i64>,
    encoder_finished: bool,
}

impl Recorder<EncoderSession, Muxer> {
    /// Opens the output file and an H.264 encoder sized to `region`.
    pub fn open(settings: &RecordSettings, region: CaptureRegion) -> anyhow::Result<Self> {
        settings.validate()?;
        let mut muxer = Muxer::create(&settings.output)?;
        let descriptor = StreamDescriptor::h264(
            region.width,
            region.height,
            settings.fps,
            settings.bit_rate,
        )
        .with_encoder_name(settings.encoder.clone())
        .with_global_header(muxer.requires_global_header());

        let encoder = EncoderSession::open(&descriptor, &settings.encoder_settings)
            .with_context(|| format!("open encoder for {}", descriptor))?;
        muxer
            .add_video_stream(&encoder)
            .with_context(|| format!("add stream to {}", settings.output.display()))?;

        Self::new(encoder, muxer, settings.fps)
    }
}

impl<E: VideoEncoder, W: PacketWriter> Recorder<E, W> {
    pub fn new(encoder: E, writer: W, fps: u32) -> anyhow::Result<Self> {
        let clock = PipelineClock::new(encoder.time_base(), fps)?;
        Ok(Self {
            encoder,
            writer,
            converter: FrameConverter::default(),
            clock,
            fps,
            state: RecorderState::Configuring,
            frames_submitted: 0,
            packets_written: 0,
            last_pts: None,
            encoder_finished: false,
        })
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Samples `capture` at the configured rate until `cancel` fires, the source
    /// ends or a stage fails, then flushes and finalizes the output.
    ///
    /// Only startup failures (container header) are returned as `Err`; anything
    /// after capture started is reported in the summary.
    pub async fn run<C: ScreenCapture>(
        self,
        capture: C,
        cancel: CancellationToken,
    ) -> anyhow::Result<RecordingSummary> {
        let (tx, rx) = mpsc::channel(1);
        let sampler = ScreenSampler::new(capture, self.fps, cancel.clone());
        self.run_with(rx, move || sampler.spawn(tx), cancel).await
    }

    /// Like [`Recorder::run`] with a caller-supplied producer. `start` is invoked
    /// once the header is written and must feed the channel behind `rx`.
    pub async fn run_with<F>(
        mut self,
        mut rx: mpsc::Receiver<RawBitmap>,
        start: F,
        cancel: CancellationToken,
    ) -> anyhow::Result<RecordingSummary>
    where
        F: FnOnce() -> JoinHandle<crate::Result<u64>>,
    {
        self.state = RecorderState::Configuring;
        self.writer.write_header().context("write container header")?;

        self.state = RecorderState::Running;
        let producer = start();
        log::info!("recording started at {} fps", self.fps);

        let mut failure: Option<anyhow::Error> = None;
        let reason = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break StopReason::Cancelled,
                bitmap = rx.recv() => match bitmap {
                    Some(bitmap) => {
                        if let Err(e) = self.process(bitmap) {
                            log::error!("pipeline error: {:#}", e);
                            failure = Some(e);
                            break StopReason::SourceClosed;
                        }
                    }
                    None => break StopReason::SourceClosed,
                },
            }
        };

        self.state = RecorderState::Stopping;
        log::info!("stopping after {} frames", self.frames_submitted);
        cancel.cancel();
        drop(rx);
        match producer.await {
            Ok(Ok(forwarded)) => log::debug!("producer forwarded {} bitmaps", forwarded),
            Ok(Err(e)) => record_failure(&mut failure, anyhow::Error::new(e).context("capture")),
            Err(e) => record_failure(&mut failure, anyhow::anyhow!("producer task: {}", e)),
        }

        self.state = RecorderState::Flushing;
        if let Err(e) = self.flush() {
            record_failure(&mut failure, e);
        }

        self.state = RecorderState::Finalized;
        if let Err(e) = self.finalize() {
            record_failure(&mut failure, e);
        }

        let summary = RecordingSummary {
            frames_submitted: self.frames_submitted,
            packets_written: self.packets_written,
            last_pts: self.last_pts,
            stop_reason: match failure {
                Some(e) => StopReason::Failed(e),
                None => reason,
            },
        };
        log::info!("recording finished: {}", summary);
        Ok(summary)
    }

    fn process(&mut self, bitmap: RawBitmap) -> anyhow::Result<()> {
        let mut frame = self.converter.convert(bitmap).context("convert bitmap")?;
        let pts = self.clock.stamp();
        frame.set_pts(pts);
        self.encoder
            .send_frame(frame)
            .with_context(|| format!("submit frame with pts {}", pts))?;
        self.frames_submitted += 1;
        self.last_pts = Some(pts);
        self.drain()?;
        Ok(())
    }

    /// Writes every ready packet. Returns true once the encoder reports end of stream.
    fn drain(&mut self) -> anyhow::Result<bool> {
        loop {
            match self.poll_encoder()? {
                Polled::Written => {}
                Polled::Pending => return Ok(false),
                Polled::Finished => return Ok(true),
            }
        }
    }

    /// One receive call; a ready packet is written before returning.
    fn poll_encoder(&mut self) -> anyhow::Result<Polled> {
        match self.encoder.receive_packet().context("receive packet")? {
            Drain::Packet(packet) => {
                self.writer.write_packet(packet).context("write packet")?;
                self.packets_written += 1;
                Ok(Polled::Written)
            }
            Drain::Pending => Ok(Polled::Pending),
            Drain::Finished => {
                self.encoder_finished = true;
                Ok(Polled::Finished)
            }
        }
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        if self.encoder_finished {
            return Ok(());
        }
        self.encoder.send_eof().context("flush encoder")?;
        // every receive call counts, packets included
        for _ in 0..MAX_FLUSH_POLLS {
            if let Polled::Finished = self.poll_encoder()? {
                log::debug!("encoder flushed, {} packets written", self.packets_written);
                return Ok(());
            }
        }
        Err(Error::FlushStalled(MAX_FLUSH_POLLS).into())
    }

    fn finalize(&mut self) -> anyhow::Result<()> {
        self.writer.write_trailer().context("write trailer")?;
        self.writer.close().context("close output")?;
        Ok(())
    }
}

enum Polled {
    Written,
    Pending,
    Finished,
}

/// Keeps the first failure, later ones are only logged.
fn record_failure(slot: &mut Option<anyhow::Error>, error: anyhow::Error) {
    match slot {
        Some(_) => log::error!("additional failure while stopping: {:#}", error),
        None => {
            log::error!("{:#}", error);
            *slot = Some(error);
        }
    }
}

#[cfg(test)]
#[path = "recorder_test.rs"]
mod recorder_test;
