use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::camera::backend::CameraBackend;
use crate::camera::error::{CameraError, Result};
use crate::camera::types::{DeviceId, MediaStream, StreamRequest, VideoTrack};
use crate::preview::capture::{Frame, FrameBuffer};

const DUMMY_DEVICE_ID: &str = "dummy:test:camera-001";
const DUMMY_DEVICE_NAME: &str = "Dummy Test Camera";

/// A fake camera backend for running without real hardware.
///
/// Each opened stream gets one track backed by a generator thread that
/// paints a moving test pattern into the stream's frame buffer at the
/// requested rate.
pub struct DummyBackend;

impl DummyBackend {
    pub fn new() -> Self {
        Self
    }

    /// The stable device ID for the dummy camera.
    pub fn device_id() -> DeviceId {
        DeviceId::new(DUMMY_DEVICE_ID)
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraBackend for DummyBackend {
    fn open(&self, request: &StreamRequest) -> Result<MediaStream> {
        if request.width == 0 || request.height == 0 {
            return Err(CameraError::DeviceUnavailable(format!(
                "unsupported resolution {}x{}",
                request.width, request.height
            )));
        }
        let buffer = Arc::new(FrameBuffer::new(3));
        let track = PatternTrack::spawn(Arc::clone(&buffer), *request)?;
        Ok(MediaStream {
            device: Self::device_id(),
            tracks: vec![Box::new(track)],
            buffer,
        })
    }
}

/// Generator-thread track producing the test pattern.
///
/// The generator sleeps on its stop channel between frames, so dropping
/// the sender wakes it at once and `stop` never waits out a frame period.
struct PatternTrack {
    label: String,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl PatternTrack {
    fn spawn(buffer: Arc<FrameBuffer>, request: StreamRequest) -> Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let fps = if request.fps > 0.0 { request.fps } else { 30.0 };
        let period = Duration::from_secs_f32(1.0 / fps);

        let thread = std::thread::Builder::new()
            .name("dummy-camera".to_string())
            .spawn(move || {
                let mut index = 0u64;
                loop {
                    if let Some(frame) = test_pattern(request.width, request.height, index) {
                        buffer.push(frame);
                    }
                    index += 1;
                    match stop_rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|e| CameraError::Backend(format!("failed to spawn generator: {e}")))?;

        Ok(Self {
            label: format!("{DUMMY_DEVICE_NAME} video"),
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

impl VideoTrack for PatternTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn stop(&mut self) {
        self.stop_tx.take();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PatternTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Gradient background with a bright vertical bar sweeping left to right.
fn test_pattern(width: u32, height: u32, index: u64) -> Option<Frame> {
    let bar_x = (index * 8 % u64::from(width)) as u32;
    let mut data = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        for x in 0..width {
            if x.abs_diff(bar_x) < 6 {
                data.extend_from_slice(&[240, 240, 240]);
            } else {
                data.push((x * 255 / width.max(1)) as u8);
                data.push((y * 255 / height.max(1)) as u8);
                data.push(96);
            }
        }
    }
    Frame::new(data, width, height)
}
