use std::time::Duration;

use tokio::{sync::mpsc, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    bitmap::RawBitmap,
    capture::ScreenCapture,
    error::{Error, Result},
};

/// Periodic producer: one capture per tick, handed to the consumer through a channel.
pub struct ScreenSampler<C> {
    capture: C,
    period: Duration,
    cancel: CancellationToken,
}

impl<C: ScreenCapture> ScreenSampler<C> {
    pub fn new(capture: C, fps: u32, cancel: CancellationToken) -> Self {
        let period = Duration::from_nanos(1_000_000_000 / fps.max(1) as u64);
        Self {
            capture,
            period,
            cancel,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Runs the sampler on the runtime. The task yields the number of forwarded bitmaps.
    pub fn spawn(self, tx: mpsc::Sender<RawBitmap>) -> JoinHandle<Result<u64>> {
        tokio::spawn(self.run(tx))
    }

    /// Captures until cancelled, the receiver goes away or a capture fails.
    /// Dropping `tx` on return closes the channel.
    pub async fn run(self, tx: mpsc::Sender<RawBitmap>) -> Result<u64> {
        let Self {
            capture,
            period,
            cancel,
        } = self;
        let region = capture.region();
        let mut capture = Some(capture);
        let mut forwarded = 0u64;

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!("sampler started: region {}, period {:?}", region, period);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(mut source) = capture.take() else {
                break;
            };
            let (source, result) = tokio::task::spawn_blocking(move || {
                let result = source.capture();
                (source, result)
            })
            .await
            .map_err(|e| Error::Capture(format!("capture task: {}", e)))?;
            capture = Some(source);

            let bitmap = match result {
                Ok(bitmap) => bitmap,
                Err(e) => {
                    log::error!("capture failed after {} bitmaps: {}", forwarded, e);
                    return Err(e);
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::debug!("sampler cancelled with a pending bitmap, dropping it");
                    break;
                }
                sent = tx.send(bitmap) => {
                    if sent.is_err() {
                        log::debug!("sampler receiver closed");
                        break;
                    }
                    forwarded += 1;
                }
            }
        }

        log::info!("sampler stopped: {} bitmaps forwarded", forwarded);
        Ok(forwarded)
    }
}
