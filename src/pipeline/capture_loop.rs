//! Capture, pace and publish loop
//!
//! One iteration grabs the screen, stamps the frame with the next id,
//! wraps it into an envelope and hands it to the publisher. Whatever is
//! left of the period afterwards is slept away. A slow iteration is not
//! paid back by later ones.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::capture::{Frame, SnapshotSource};
use crate::envelope::{self, FrameId, Transform};
use crate::error::PipelineError;
use crate::publish::Publisher;
use crate::PipelineConfig;

/// Counters kept across the lifetime of a loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub iterations: u64,
    pub published: u64,
    pub capture_failures: u64,
    /// Iterations that used up the whole period and skipped the sleep.
    pub overruns: u64,
}

/// What a single iteration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Published { frame_id: FrameId, bytes: usize },
    Skipped,
}

/// Time left in the period, or `None` if the iteration overran it.
pub fn residual_sleep(period: Duration, elapsed: Duration) -> Option<Duration> {
    if elapsed < period {
        Some(period - elapsed)
    } else {
        None
    }
}

/// Owns everything the capture thread touches.
pub struct CaptureLoop<S, P> {
    source: S,
    publisher: P,
    transform: Transform,
    period: Duration,
    frame_id: FrameId,
    epoch: Instant,
    preview: Option<flume::Sender<Frame>>,
    stats: LoopStats,
}

impl<S, P> CaptureLoop<S, P>
where
    S: SnapshotSource + Send,
    P: Publisher + Send,
{
    pub fn new(source: S, publisher: P, config: &PipelineConfig) -> Self {
        Self {
            source,
            publisher,
            transform: Transform::IDENTITY,
            period: config.period(),
            frame_id: 0,
            epoch: Instant::now(),
            preview: None,
            stats: LoopStats::default(),
        }
    }

    /// Mirror every captured frame to a diagnostic sink.
    ///
    /// Frames are offered with `try_send`; when the sink is still busy
    /// with the previous one the new frame is simply not shown.
    pub fn with_preview(mut self, tx: flume::Sender<Frame>) -> Self {
        self.preview = Some(tx);
        self
    }

    /// Id of the last published frame (0 before the first).
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Capture, encode and publish once. No pacing.
    pub async fn tick(&mut self) -> Result<TickOutcome, PipelineError> {
        Ok(self.step().await?.0)
    }

    async fn step(&mut self) -> Result<(TickOutcome, Option<Frame>), PipelineError> {
        self.stats.iterations += 1;

        let frame = match self.source.capture().await {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.capture_failures += 1;
                metrics::counter!("roadcam_capture_failures").increment(1);
                warn!("Capture failed, skipping frame: {}", e);
                return Ok((TickOutcome::Skipped, None));
            }
        };

        let frame_id = self.frame_id.wrapping_add(1);
        let log_mono_time = self.epoch.elapsed().as_nanos() as u64;
        let bytes: Bytes = envelope::encode_frame(&frame, frame_id, &self.transform, log_mono_time)?;
        let len = bytes.len();

        self.frame_id = frame_id;
        self.publisher.send(bytes);
        self.stats.published += 1;

        metrics::counter!("roadcam_frames_published").increment(1);
        metrics::histogram!("roadcam_envelope_bytes").record(len as f64);
        debug!(
            frame_id,
            width = frame.meta.width,
            height = frame.meta.height,
            bytes = len,
            "Published frame"
        );

        Ok((TickOutcome::Published { frame_id, bytes: len }, Some(frame)))
    }

    fn offer_preview(&mut self, frame: Frame) {
        let Some(tx) = &self.preview else {
            return;
        };
        match tx.try_send(frame) {
            Ok(()) | Err(flume::TrySendError::Full(_)) => {}
            Err(flume::TrySendError::Disconnected(_)) => {
                info!("Preview closed, no longer mirroring frames");
                self.preview = None;
            }
        }
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Cancellation is checked before every iteration and raced against
    /// the pacing sleep. An iteration already under way always finishes.
    #[instrument(skip_all, fields(period_ms = self.period.as_millis() as u64))]
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<LoopStats, PipelineError> {
        info!("Capture loop started");

        while !shutdown.is_cancelled() {
            let t1 = Instant::now();
            let (_, frame) = self.step().await?;
            let elapsed = t1.elapsed();

            metrics::histogram!("roadcam_iteration_ms").record(elapsed.as_secs_f64() * 1000.0);

            // Outside the measured window so it never eats into the budget.
            if let Some(frame) = frame {
                self.offer_preview(frame);
            }

            match residual_sleep(self.period, elapsed) {
                Some(wait) => {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                None => {
                    self.stats.overruns += 1;
                    metrics::counter!("roadcam_loop_overruns").increment(1);
                    debug!(elapsed_ms = elapsed.as_millis() as u64, "Iteration overran period");
                }
            }
        }

        info!(
            published = self.stats.published,
            failures = self.stats.capture_failures,
            "Capture loop stopped"
        );
        Ok(self.stats)
    }
}
