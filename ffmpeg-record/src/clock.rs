use ffmpeg_next::Rational;

/// 90kHz, the usual video time base.
pub const VIDEO_TIME_BASE: Rational = Rational(1, 90_000);

/// Frame numbering and presentation timestamps for a fixed frame rate.
///
/// `pts(n) = n * increment`, where `increment = time_base_frequency / fps`.
/// The timestamp is always recomputed from the frame number so rounding in
/// `increment` never accumulates.
#[derive(Debug, Clone)]
pub struct PipelineClock {
    frame_number: i64,
    increment: i64,
    time_base: Rational,
}

impl PipelineClock {
    pub fn new(time_base: Rational, fps: u32) -> anyhow::Result<Self> {
        if fps == 0 {
            anyhow::bail!("fps must be greater than zero");
        }
        if time_base.numerator() <= 0 || time_base.denominator() <= 0 {
            anyhow::bail!("invalid time base {}", time_base);
        }
        // ticks per second in `time_base` units
        let frequency = time_base.denominator() as i64 / time_base.numerator() as i64;
        let increment = frequency / fps as i64;
        if increment == 0 {
            anyhow::bail!("fps {} exceeds time base frequency {}", fps, frequency);
        }
        Ok(Self {
            frame_number: 0,
            increment,
            time_base,
        })
    }

    pub fn increment(&self) -> i64 {
        self.increment
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Number of frames stamped so far.
    pub fn frame_number(&self) -> i64 {
        self.frame_number
    }

    pub fn pts_of(&self, frame_number: i64) -> i64 {
        frame_number * self.increment
    }

    /// Returns the pts of the next frame and advances the counter.
    pub fn stamp(&mut self) -> i64 {
        let pts = self.pts_of(self.frame_number);
        self.frame_number += 1;
        pts
    }
}
