use ffmpeg_next::Rational;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the capture, conversion, encode and mux stages.
///
/// Every variant is fatal for the stage that produced it; the recorder decides
/// what happens next.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("codec not found: {0}")]
    CodecNotFound(String),
    #[error("codec context allocation failed: {0}")]
    ContextAlloc(#[source] ffmpeg_next::Error),
    #[error("encoder open failed ({codec}): {source}")]
    EncoderOpen {
        codec: String,
        #[source]
        source: ffmpeg_next::Error,
    },

    #[error("frame buffer allocation failed for {width}x{height}: {source}")]
    FrameAlloc {
        width: u32,
        height: u32,
        #[source]
        source: ffmpeg_next::Error,
    },
    #[error("frame is not writable: {0}")]
    NotWritable(#[source] ffmpeg_next::Error),
    #[error("pixel copy failed: {0}")]
    PixelCopy(String),
    #[error("scaler context creation failed: {0}")]
    ScalerContext(#[source] ffmpeg_next::Error),
    #[error("scale failed: {0}")]
    Scale(#[source] ffmpeg_next::Error),

    #[error("send frame failed: {0}")]
    SendFrame(#[source] ffmpeg_next::Error),
    #[error("send eof failed: {0}")]
    SendEof(#[source] ffmpeg_next::Error),
    #[error("non monotonic pts: {pts:?} after {previous:?}")]
    NonMonotonicPts { pts: Option<i64>, previous: Option<i64> },
    #[error("receive packet failed: {0}")]
    ReceivePacket(#[source] ffmpeg_next::Error),
    #[error("encoder did not finish after {0} polls")]
    FlushStalled(usize),

    #[error("open output {path} failed: {source}")]
    OutputOpen {
        path: String,
        #[source]
        source: ffmpeg_next::Error,
    },
    #[error("add output stream failed: {0}")]
    AddStream(#[source] ffmpeg_next::Error),
    #[error("write header failed: {0}")]
    WriteHeader(#[source] ffmpeg_next::Error),
    #[error("write packet failed (pts {pts:?}, time_base {time_base}): {source}")]
    WritePacket {
        pts: Option<i64>,
        time_base: Rational,
        #[source]
        source: ffmpeg_next::Error,
    },
    #[error("write trailer failed: {0}")]
    WriteTrailer(#[source] ffmpeg_next::Error),
    #[error("invalid muxer state: {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: crate::output::MuxerState,
    },

    #[error("capture failed: {0}")]
    Capture(String),
    #[error("capture device {device} unavailable: {source}")]
    CaptureDevice {
        device: String,
        #[source]
        source: ffmpeg_next::Error,
    },
}
