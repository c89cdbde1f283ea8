use image::RgbImage;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::camera::backend::CameraBackend;
use crate::camera::error::Result;
use crate::camera::source::CaptureSource;
use crate::camera::types::StreamRequest;
use crate::diagnostics::stats::{DiagnosticSnapshot, PipelineStats};
use crate::pipeline::channel::{ChannelState, FrameSink, StreamChannel};
use crate::pipeline::overlay::{OverlaySnapshot, OverlayState};
use crate::pipeline::render::{RenderLoop, SharedSurface, Surface};
use crate::pipeline::sampler::{FrameSampler, SamplerConfig, SamplerHandle};
use crate::pipeline::selector::SessionSelector;

/// Everything the pipeline needs to run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub ws_url: String,
    pub sampler: SamplerConfig,
    pub render_period: Duration,
    pub stream: StreamRequest,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8000/ws".to_string(),
            sampler: SamplerConfig::default(),
            render_period: Duration::from_micros(16_667),
            stream: StreamRequest::default(),
        }
    }
}

/// Owns every component of the live pipeline.
///
/// Lifecycle: `create → (start_session / stop_session)* → shutdown`. The
/// channel and the render loop live from `create` to `shutdown`; the
/// capture session and its sampling timer come and go in between.
pub struct Pipeline {
    config: PipelineConfig,
    capture: CaptureSource,
    selector: Arc<SessionSelector>,
    overlay: Arc<OverlayState>,
    channel: Arc<StreamChannel>,
    channel_task: Option<JoinHandle<()>>,
    sampler: Option<SamplerHandle>,
    render: RenderLoop,
    surface: SharedSurface,
    stats: Arc<Mutex<PipelineStats>>,
}

impl Pipeline {
    /// Open the channel and start the render loop. Must be called from
    /// within a tokio runtime.
    pub fn create(config: PipelineConfig, backend: Arc<dyn CameraBackend>) -> Self {
        let stats = Arc::new(Mutex::new(PipelineStats::new()));
        let overlay = Arc::new(OverlayState::new());
        let surface: SharedSurface = Arc::new(Mutex::new(None));
        let capture = CaptureSource::new(backend, config.stream);

        let channel = StreamChannel::new(Arc::clone(&overlay), Arc::clone(&stats));
        let channel_task = channel.connect(config.ws_url.clone());

        let render = RenderLoop::spawn(
            config.render_period,
            capture.signal(),
            Arc::clone(&overlay),
            Arc::clone(&surface),
            Arc::clone(&stats),
        );
        info!("pipeline created (channel: {})", config.ws_url);

        Self {
            config,
            capture,
            selector: Arc::new(SessionSelector::new()),
            overlay,
            channel,
            channel_task,
            sampler: None,
            render,
            surface,
            stats,
        }
    }

    /// Acquire the camera and start sampling. Reopens the channel if it
    /// has closed since the last session.
    pub async fn start_session(&mut self) -> Result<()> {
        self.capture.start().await?;

        if self.channel.state() == ChannelState::Closed {
            info!("detection channel closed; reconnecting for new session");
            if let Some(task) = self.channel.connect(self.config.ws_url.clone()) {
                self.channel_task = Some(task);
            }
        }

        if self.sampler.is_none() {
            let sampler = FrameSampler::new(
                self.capture.signal(),
                Arc::clone(&self.selector),
                Arc::clone(&self.surface),
                Arc::clone(&self.channel) as Arc<dyn FrameSink>,
                self.config.sampler.clone(),
                Arc::clone(&self.stats),
            );
            self.sampler = Some(sampler.spawn());
        }
        Ok(())
    }

    /// Cancel the sampling timer, then release the camera. Idempotent.
    ///
    /// The overlay is left as is; a stale result stays visible until the
    /// next inbound message.
    pub fn stop_session(&mut self) {
        if let Some(mut sampler) = self.sampler.take() {
            sampler.cancel();
        }
        self.capture.stop();
    }

    pub fn is_session_active(&self) -> bool {
        self.capture.is_active()
    }

    /// Set or clear the subject attached to outgoing frames.
    pub fn select_subject(&self, subject_id: Option<&str>) {
        match subject_id {
            Some(id) => self.selector.select(id),
            None => self.selector.clear(),
        }
    }

    pub fn selected_subject(&self) -> Option<String> {
        self.selector.current()
    }

    /// Attach the display surface, returning the previous one.
    pub fn attach_surface(&self, surface: Box<dyn Surface>) -> Option<Box<dyn Surface>> {
        self.surface.lock().replace(surface)
    }

    pub fn detach_surface(&self) -> Option<Box<dyn Surface>> {
        self.surface.lock().take()
    }

    /// Pixels currently on the display surface.
    pub fn surface_image(&self) -> Option<RgbImage> {
        self.surface.lock().as_ref().and_then(|s| s.to_image())
    }

    pub fn overlay(&self) -> OverlaySnapshot {
        self.overlay.read()
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn is_render_loop_running(&self) -> bool {
        self.render.is_running()
    }

    pub fn diagnostics(&self) -> DiagnosticSnapshot {
        self.stats.lock().snapshot()
    }

    /// Stop the session, close the channel and end the render loop.
    pub async fn shutdown(mut self) {
        self.stop_session();
        self.channel.close();
        if let Some(task) = self.channel_task.take() {
            let _ = task.await;
        }
        self.render.stop().await;
        info!("pipeline shut down");
    }
}
