use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::RuntimeFlavor;
use tracing::{info, warn};

use crate::camera::backend::CameraBackend;
use crate::camera::error::{CameraError, Result};
use crate::camera::types::{MediaStream, StreamRequest};
use crate::preview::capture::{Frame, FrameBuffer};

/// Read handle on the live video of the current capture session.
///
/// Cloned freely into the sampler and the render loop. Only the
/// [`CaptureSource`] attaches or clears the underlying buffer.
#[derive(Clone, Default)]
pub struct VideoSignal {
    buffer: Arc<Mutex<Option<Arc<FrameBuffer>>>>,
}

impl VideoSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a capture session currently feeds this signal.
    pub fn is_attached(&self) -> bool {
        self.buffer.lock().is_some()
    }

    /// Newest frame of the attached session. `None` when no session is
    /// attached or the device has not delivered a frame yet.
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        let buffer = self.buffer.lock().clone()?;
        buffer.latest()
    }

    pub(crate) fn attach(&self, buffer: Arc<FrameBuffer>) {
        *self.buffer.lock() = Some(buffer);
    }

    pub(crate) fn clear(&self) {
        self.buffer.lock().take();
    }
}

/// Owns the camera device for at most one capture session at a time.
pub struct CaptureSource {
    backend: Arc<dyn CameraBackend>,
    request: StreamRequest,
    stream: Option<MediaStream>,
    signal: VideoSignal,
}

impl CaptureSource {
    pub fn new(backend: Arc<dyn CameraBackend>, request: StreamRequest) -> Self {
        Self {
            backend,
            request,
            stream: None,
            signal: VideoSignal::new(),
        }
    }

    /// A read handle on this source's video signal.
    pub fn signal(&self) -> VideoSignal {
        self.signal.clone()
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    /// Request device access and attach the resulting stream to the signal.
    ///
    /// Device negotiation runs on the blocking pool so the executor keeps
    /// servicing the render loop and the channel meanwhile. Starting an
    /// already active source is a no-op.
    pub async fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let backend = Arc::clone(&self.backend);
        let request = self.request;
        let stream = tokio::task::spawn_blocking(move || backend.open(&request))
            .await
            .map_err(|e| CameraError::Backend(format!("device open task failed: {e}")))?
            .inspect_err(|e| warn!("camera start failed: {e}"))?;

        info!(
            "capture session started on {} ({} track(s))",
            stream.device,
            stream.tracks.len()
        );
        self.signal.attach(Arc::clone(&stream.buffer));
        self.stream = Some(stream);
        Ok(())
    }

    /// Halt every track and detach the signal. Idempotent; safe to call
    /// without an active session.
    pub fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            halt_tracks(&mut stream);
            info!("capture session stopped on {}", stream.device);
        }
        self.signal.clear();
    }
}

/// Halt every track of `stream`.
///
/// Releasing a device can wait for a frame already being dequeued, so on a
/// multi-threaded runtime the worker hands its other tasks off first.
fn halt_tracks(stream: &mut MediaStream) {
    let multi_thread = tokio::runtime::Handle::try_current()
        .is_ok_and(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread);
    if multi_thread {
        tokio::task::block_in_place(|| stream.stop_all());
    } else {
        stream.stop_all();
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.stop();
    }
}
