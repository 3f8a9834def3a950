use std::collections::VecDeque;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;

use ffmpeg_next::Rational;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{RecordSettings, Recorder, RecorderState, StopReason, MAX_FLUSH_POLLS};
use crate::{
    bitmap::{CaptureRegion, RawBitmap},
    capture::{Pattern, PatternCapture, ScreenCapture},
    clock::VIDEO_TIME_BASE,
    encoder::{Drain, VideoEncoder},
    error::{Error, Result},
    frame::CodecFrame,
    output::PacketWriter,
    packet::EncodedPacket,
};

/// Encoder double: holds `delay` frames back and emits `per_frame` packets per frame.
struct ScriptedEncoder {
    submitted: Arc<Mutex<Vec<i64>>>,
    held: VecDeque<i64>,
    ready: VecDeque<EncodedPacket>,
    delay: usize,
    per_frame: usize,
    eof: bool,
    never_finish: bool,
    /// Keeps producing packets after eof instead of finishing.
    endless: bool,
    submit_delay: Option<Duration>,
}

impl ScriptedEncoder {
    fn new(submitted: Arc<Mutex<Vec<i64>>>) -> Self {
        Self {
            submitted,
            held: VecDeque::new(),
            ready: VecDeque::new(),
            delay: 0,
            per_frame: 1,
            eof: false,
            never_finish: false,
            endless: false,
            submit_delay: None,
        }
    }

    fn release(&mut self, pts: i64) {
        for k in 0..self.per_frame {
            let dts = pts + k as i64;
            let packet = EncodedPacket::from_data(&[0u8; 16], pts, dts, VIDEO_TIME_BASE);
            self.ready.push_back(packet);
        }
    }
}

impl VideoEncoder for ScriptedEncoder {
    fn time_base(&self) -> Rational {
        VIDEO_TIME_BASE
    }

    fn send_frame(&mut self, frame: CodecFrame) -> Result<()> {
        let pts = frame.pts().unwrap_or(-1);
        self.submitted.lock().unwrap().push(pts);
        if let Some(delay) = self.submit_delay {
            std::thread::sleep(delay);
        }
        self.held.push_back(pts);
        while self.held.len() > self.delay {
            let pts = self.held.pop_front().unwrap();
            self.release(pts);
        }
        Ok(())
    }

    fn send_eof(&mut self) -> Result<()> {
        self.eof = true;
        while let Some(pts) = self.held.pop_front() {
            self.release(pts);
        }
        Ok(())
    }

    fn receive_packet(&mut self) -> Result<Drain> {
        if let Some(packet) = self.ready.pop_front() {
            return Ok(Drain::Packet(packet));
        }
        if self.eof && self.endless {
            let pts = self.submitted.lock().unwrap().last().copied().unwrap_or_default();
            return Ok(Drain::Packet(EncodedPacket::from_data(
                &[0u8; 16],
                pts,
                pts,
                VIDEO_TIME_BASE,
            )));
        }
        if self.eof && !self.never_finish {
            return Ok(Drain::Finished);
        }
        Ok(Drain::Pending)
    }
}

#[derive(Default)]
struct WriterLog {
    headers: usize,
    trailers: usize,
    closed: usize,
    dts: Vec<i64>,
}

/// Writer double rescaling into an mp4-like stream time base.
struct RecordingWriter {
    log: Arc<Mutex<WriterLog>>,
    time_base: Rational,
    trailer_written: bool,
}

impl RecordingWriter {
    fn new(log: Arc<Mutex<WriterLog>>) -> Self {
        Self {
            log,
            time_base: Rational(1, 15360),
            trailer_written: false,
        }
    }
}

impl PacketWriter for RecordingWriter {
    fn write_header(&mut self) -> Result<()> {
        self.log.lock().unwrap().headers += 1;
        Ok(())
    }

    fn write_packet(&mut self, mut packet: EncodedPacket) -> Result<()> {
        packet.rescale_to(self.time_base);
        self.log
            .lock()
            .unwrap()
            .dts
            .push(packet.dts().unwrap_or_default());
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        if !self.trailer_written {
            self.trailer_written = true;
            self.log.lock().unwrap().trailers += 1;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.log.lock().unwrap().closed += 1;
        Ok(())
    }
}

/// Counts calls and fails on call `fail_at` (1-based).
struct CountingCapture {
    calls: Arc<AtomicU64>,
    fail_at: Option<u64>,
}

impl ScreenCapture for CountingCapture {
    fn region(&self) -> CaptureRegion {
        CaptureRegion::sized(16, 16)
    }

    fn capture(&mut self) -> Result<RawBitmap> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if Some(n) == self.fail_at {
            return Err(Error::Capture("window closed".to_string()));
        }
        RawBitmap::solid(16, 16, [(n * 10) as u8, 64, 128, 255])
    }
}

fn doubles() -> (
    ScriptedEncoder,
    RecordingWriter,
    Arc<Mutex<Vec<i64>>>,
    Arc<Mutex<WriterLog>>,
) {
    let submitted = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::new(Mutex::new(WriterLog::default()));
    (
        ScriptedEncoder::new(submitted.clone()),
        RecordingWriter::new(log.clone()),
        submitted,
        log,
    )
}

#[tokio::test]
async fn test_ten_bitmaps_at_30fps() -> anyhow::Result<()> {
    let (encoder, writer, submitted, log) = doubles();
    let recorder = Recorder::new(encoder, writer, 30)?;
    assert_eq!(recorder.state(), RecorderState::Configuring);

    let (tx, rx) = mpsc::channel(1);
    let summary = recorder
        .run_with(
            rx,
            move || {
                tokio::spawn(async move {
                    for i in 0..10u8 {
                        let bitmap = RawBitmap::solid(16, 16, [i * 20, 0, 0, 255])?;
                        if tx.send(bitmap).await.is_err() {
                            break;
                        }
                    }
                    Ok::<u64, Error>(10)
                })
            },
            CancellationToken::new(),
        )
        .await?;

    let expected: Vec<i64> = (0..10).map(|n| n * 3000).collect();
    assert_eq!(*submitted.lock().unwrap(), expected);
    assert_eq!(summary.frames_submitted, 10);
    assert_eq!(summary.packets_written, 10);
    assert_eq!(summary.last_pts, Some(27_000));
    assert!(matches!(summary.stop_reason, StopReason::SourceClosed));

    let log = log.lock().unwrap();
    assert_eq!((log.headers, log.trailers, log.closed), (1, 1, 1));
    // 3000 ticks of 1/90000 are 512 ticks of 1/15360
    assert_eq!(log.dts.last(), Some(&(9 * 512)));
    Ok(())
}

#[tokio::test]
async fn test_capture_error_on_fifth_tick() -> anyhow::Result<()> {
    let (encoder, writer, submitted, log) = doubles();
    let recorder = Recorder::new(encoder, writer, 100)?;
    let capture = CountingCapture {
        calls: Arc::new(AtomicU64::new(0)),
        fail_at: Some(5),
    };

    let summary = recorder.run(capture, CancellationToken::new()).await?;

    assert_eq!(summary.frames_submitted, 4);
    assert_eq!(submitted.lock().unwrap().len(), 4);
    assert_eq!(summary.packets_written, 4);
    match &summary.stop_reason {
        StopReason::Failed(e) => assert!(
            matches!(e.downcast_ref::<Error>(), Some(Error::Capture(_))),
            "unexpected failure: {:#}",
            e
        ),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(log.lock().unwrap().trailers, 1);
    Ok(())
}

#[tokio::test]
async fn test_packets_non_decreasing_with_reordering_encoder() -> anyhow::Result<()> {
    let (mut encoder, writer, _, log) = doubles();
    encoder.delay = 2;
    encoder.per_frame = 3;
    let recorder = Recorder::new(encoder, writer, 30)?;

    let (tx, rx) = mpsc::channel(1);
    let summary = recorder
        .run_with(
            rx,
            move || {
                tokio::spawn(async move {
                    for _ in 0..6 {
                        let bitmap = RawBitmap::solid(16, 16, [0, 0, 0, 255])?;
                        if tx.send(bitmap).await.is_err() {
                            break;
                        }
                    }
                    Ok::<u64, Error>(6)
                })
            },
            CancellationToken::new(),
        )
        .await?;

    // held frames come out during the flush
    assert_eq!(summary.packets_written, 18);
    let log = log.lock().unwrap();
    assert_eq!(log.dts.len(), 18);
    assert!(log.dts.windows(2).all(|w| w[0] <= w[1]), "dts {:?}", log.dts);
    Ok(())
}

#[tokio::test]
async fn test_stalled_flush_is_detected() -> anyhow::Result<()> {
    let (mut encoder, writer, _, log) = doubles();
    encoder.never_finish = true;
    let recorder = Recorder::new(encoder, writer, 30)?;

    let (tx, rx) = mpsc::channel(1);
    let run = recorder.run_with(
        rx,
        move || {
            tokio::spawn(async move {
                let bitmap = RawBitmap::solid(16, 16, [1, 2, 3, 255])?;
                let _ = tx.send(bitmap).await;
                Ok::<u64, Error>(1)
            })
        },
        CancellationToken::new(),
    );
    let summary = tokio::time::timeout(Duration::from_secs(5), run).await??;

    match &summary.stop_reason {
        StopReason::Failed(e) => assert!(matches!(
            e.downcast_ref::<Error>(),
            Some(Error::FlushStalled(MAX_FLUSH_POLLS))
        )),
        other => panic!("expected flush stall, got {:?}", other),
    }
    // finalization still runs
    assert_eq!(log.lock().unwrap().trailers, 1);
    Ok(())
}

#[tokio::test]
async fn test_flush_bounded_when_encoder_never_stops_emitting() -> anyhow::Result<()> {
    let (mut encoder, writer, _, log) = doubles();
    encoder.endless = true;
    let recorder = Recorder::new(encoder, writer, 30)?;

    let (tx, rx) = mpsc::channel(1);
    let run = recorder.run_with(
        rx,
        move || {
            tokio::spawn(async move {
                let bitmap = RawBitmap::solid(16, 16, [4, 5, 6, 255])?;
                let _ = tx.send(bitmap).await;
                Ok::<u64, Error>(1)
            })
        },
        CancellationToken::new(),
    );
    let summary = tokio::time::timeout(Duration::from_secs(5), run).await??;

    match &summary.stop_reason {
        StopReason::Failed(e) => assert!(matches!(
            e.downcast_ref::<Error>(),
            Some(Error::FlushStalled(MAX_FLUSH_POLLS))
        )),
        other => panic!("expected flush stall, got {:?}", other),
    }
    // one packet while running, then one per receive call during the flush
    assert_eq!(summary.packets_written, 1 + MAX_FLUSH_POLLS as u64);
    let log = log.lock().unwrap();
    assert_eq!((log.trailers, log.closed), (1, 1));
    Ok(())
}

#[tokio::test]
async fn test_double_cancel_finalizes_once() -> anyhow::Result<()> {
    let (encoder, writer, _, log) = doubles();
    let recorder = Recorder::new(encoder, writer, 100)?;
    let cancel = CancellationToken::new();

    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        stopper.cancel();
        stopper.cancel();
    });

    let summary = recorder
        .run(PatternCapture::new(16, 16, Pattern::Bars), cancel.clone())
        .await?;
    cancel.cancel();

    assert!(matches!(summary.stop_reason, StopReason::Cancelled));
    assert!(summary.frames_submitted > 0);
    assert_eq!(summary.packets_written, summary.frames_submitted);
    let log = log.lock().unwrap();
    assert_eq!((log.headers, log.trailers, log.closed), (1, 1, 1));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_with_pending_handoff() -> anyhow::Result<()> {
    let (mut encoder, writer, submitted, log) = doubles();
    // slow consumer: the sampler ends up waiting on a full channel
    encoder.submit_delay = Some(Duration::from_millis(40));
    let recorder = Recorder::new(encoder, writer, 200)?;
    let calls = Arc::new(AtomicU64::new(0));
    let capture = CountingCapture {
        calls: calls.clone(),
        fail_at: None,
    };
    let cancel = CancellationToken::new();

    let stopper = cancel.clone();
    let observed = submitted.clone();
    let at_cancel = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        stopper.cancel();
        observed.lock().unwrap().len()
    });

    let summary = recorder.run(capture, cancel).await?;
    let at_cancel = at_cancel.await?;

    assert!(matches!(summary.stop_reason, StopReason::Cancelled));
    // at most the frame already in the converter when cancel fired
    assert!(
        summary.frames_submitted as usize <= at_cancel + 1,
        "{} submitted, {} at cancel",
        summary.frames_submitted,
        at_cancel
    );
    assert!(calls.load(Ordering::SeqCst) > summary.frames_submitted);
    assert_eq!(log.lock().unwrap().trailers, 1);
    Ok(())
}

#[tokio::test]
async fn test_record_mp4_file() -> anyhow::Result<()> {
    crate::init()?;
    if ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::H264).is_none() {
        eprintln!("skip: no H.264 encoder in this FFmpeg build");
        return Ok(());
    }
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("capture.mp4");
    let settings = RecordSettings {
        output: path.clone(),
        fps: 30,
        bit_rate: 400_000,
        ..RecordSettings::default()
    };
    let capture = PatternCapture::new(64, 48, Pattern::Bars);
    let recorder = Recorder::open(&settings, capture.region())?;

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        stopper.cancel();
    });
    let summary = recorder.run(capture, cancel).await?;

    assert!(matches!(summary.stop_reason, StopReason::Cancelled), "{}", summary);
    assert!(summary.frames_submitted > 0);
    assert_eq!(summary.packets_written, summary.frames_submitted);
    assert!(std::fs::metadata(&path)?.len() > 0);

    let input = ffmpeg_next::format::input(&path)?;
    let stream = input
        .streams()
        .best(ffmpeg_next::media::Type::Video)
        .ok_or_else(|| anyhow::anyhow!("no video stream in {}", path.display()))?;
    let decoder = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?
        .decoder()
        .video()?;
    assert_eq!((decoder.width(), decoder.height()), (64, 48));
    Ok(())
}

#[test]
fn test_settings_validation() {
    assert!(RecordSettings::default().validate().is_ok());
    let bad = [
        RecordSettings {
            fps: 0,
            ..RecordSettings::default()
        },
        RecordSettings {
            fps: 90_001,
            ..RecordSettings::default()
        },
        RecordSettings {
            bit_rate: 0,
            ..RecordSettings::default()
        },
        RecordSettings {
            width: Some(641),
            height: Some(480),
            ..RecordSettings::default()
        },
        RecordSettings {
            width: Some(640),
            height: None,
            ..RecordSettings::default()
        },
    ];
    for settings in bad {
        assert!(settings.validate().is_err(), "{:?}", settings);
    }
}
