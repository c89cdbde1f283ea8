use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::camera::source::VideoSignal;
use crate::diagnostics::stats::PipelineStats;
use crate::pipeline::channel::FrameSink;
use crate::pipeline::protocol::FrameSubmission;
use crate::pipeline::render::SharedSurface;
use crate::pipeline::selector::SessionSelector;
use crate::preview::compress::frame_to_data_uri;

/// Fixed parameters of the sampling timer.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub period: Duration,
    pub client_id: String,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
            client_id: "frontend-user-123".to_string(),
            jpeg_quality: 50,
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Sent,
    /// No capture session.
    Inactive,
    NoSubject,
    /// No surface attached or no frame delivered yet.
    NotReady,
    EncodeFailed,
    /// The channel was not open; the frame is lost.
    Dropped,
    Cancelled,
}

/// Samples the video signal and ships frames to the detection channel.
pub struct FrameSampler {
    signal: VideoSignal,
    selector: Arc<SessionSelector>,
    surface: SharedSurface,
    sink: Arc<dyn FrameSink>,
    config: SamplerConfig,
    stats: Arc<Mutex<PipelineStats>>,
    /// Set once on cancellation; held while handing a frame to the sink.
    cancelled: Arc<Mutex<bool>>,
}

impl FrameSampler {
    pub fn new(
        signal: VideoSignal,
        selector: Arc<SessionSelector>,
        surface: SharedSurface,
        sink: Arc<dyn FrameSink>,
        config: SamplerConfig,
        stats: Arc<Mutex<PipelineStats>>,
    ) -> Self {
        Self {
            signal,
            selector,
            surface,
            sink,
            config,
            stats,
            cancelled: Arc::new(Mutex::new(false)),
        }
    }

    /// Run one sample: gate, capture, encode, submit.
    pub async fn tick(&self) -> TickOutcome {
        if *self.cancelled.lock() {
            return TickOutcome::Cancelled;
        }
        if !self.signal.is_attached() {
            self.stats.lock().record_skipped();
            return TickOutcome::Inactive;
        }
        let Some(subject_id) = self.selector.current() else {
            self.stats.lock().record_skipped();
            return TickOutcome::NoSubject;
        };
        let surface_ready = self.surface.lock().is_some();
        let frame = match self.signal.latest_frame() {
            Some(frame) if surface_ready => frame,
            _ => {
                self.stats.lock().record_skipped();
                return TickOutcome::NotReady;
            }
        };

        let quality = self.config.jpeg_quality;
        let encoded = tokio::task::spawn_blocking(move || frame_to_data_uri(&frame, quality))
            .await
            .ok()
            .flatten();
        let Some(frame_b64) = encoded else {
            warn!("frame encode failed; skipping tick");
            self.stats.lock().record_encode_failure();
            return TickOutcome::EncodeFailed;
        };

        let submission = FrameSubmission {
            subject_id,
            client_id: self.config.client_id.clone(),
            frame_b64,
        };
        let bytes = submission.frame_b64.len();

        let cancelled = self.cancelled.lock();
        if *cancelled {
            return TickOutcome::Cancelled;
        }
        match self.sink.submit(&submission) {
            Ok(()) => {
                self.stats.lock().record_sent(bytes);
                TickOutcome::Sent
            }
            Err(e) => {
                debug!("frame dropped: {e}");
                self.stats.lock().record_dropped();
                TickOutcome::Dropped
            }
        }
    }

    /// Start the periodic timer. The first sample happens one period after
    /// the call.
    pub fn spawn(self) -> SamplerHandle {
        let cancelled = Arc::clone(&self.cancelled);
        let period = self.config.period;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let outcome = self.tick().await;
                if outcome == TickOutcome::Cancelled {
                    break;
                }
                debug!("sampler tick: {outcome:?}");
            }
        });
        SamplerHandle {
            cancelled,
            task: Some(task),
        }
    }
}

/// Owner's handle on a running sampler timer.
pub struct SamplerHandle {
    cancelled: Arc<Mutex<bool>>,
    task: Option<JoinHandle<()>>,
}

impl SamplerHandle {
    /// Cancel the timer. Once this returns no tick can reach the sink, even
    /// one whose encode is still in flight.
    pub fn cancel(&mut self) {
        *self.cancelled.lock() = true;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock()
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
