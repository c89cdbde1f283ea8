//! Video4Linux2 capture.
//!
//! The device is opened, configured and streamed on a dedicated capture
//! thread; `open` waits for that thread to report whether the device came
//! up. Stopping the track ends the thread, which drops the mmap stream and
//! then the device, turning the camera off.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;

use crate::camera::backend::CameraBackend;
use crate::camera::error::{CameraError, Result};
use crate::camera::types::{DeviceId, MediaStream, StreamRequest, VideoTrack};
use crate::preview::capture::FrameBuffer;
use crate::preview::convert::PixelLayout;

const MMAP_BUFFERS: u32 = 4;

/// Camera backend over a V4L2 device node such as `/dev/video0`.
pub struct V4l2Backend {
    path: PathBuf,
}

impl V4l2Backend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CameraBackend for V4l2Backend {
    fn open(&self, request: &StreamRequest) -> Result<MediaStream> {
        let buffer = Arc::new(FrameBuffer::new(3));
        let track = CaptureTrack::spawn(self.path.clone(), *request, Arc::clone(&buffer))?;
        Ok(MediaStream {
            device: DeviceId::new(self.path.display().to_string()),
            tracks: vec![Box::new(track)],
            buffer,
        })
    }
}

/// Negotiated stream shape.
struct Negotiated {
    width: u32,
    height: u32,
    layout: PixelLayout,
}

struct CaptureTrack {
    label: String,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureTrack {
    fn spawn(path: PathBuf, request: StreamRequest, buffer: Arc<FrameBuffer>) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let running_thread = Arc::clone(&running);
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let label = format!("{} video", path.display());

        let thread = std::thread::Builder::new()
            .name("v4l2-capture".to_string())
            .spawn(move || capture(&path, request, &buffer, &running_thread, ready_tx))
            .map_err(|e| CameraError::Backend(format!("failed to spawn capture thread: {e}")))?;

        let mut track = Self {
            label,
            running,
            thread: Some(thread),
        };
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(track),
            Ok(Err(e)) => {
                track.stop();
                Err(e)
            }
            Err(_) => {
                track.stop();
                Err(CameraError::Backend(
                    "capture thread exited during setup".to_string(),
                ))
            }
        }
    }
}

impl VideoTrack for CaptureTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

fn unavailable(path: &Path, what: &str, err: impl std::fmt::Display) -> CameraError {
    CameraError::DeviceUnavailable(format!("{}: {what}: {err}", path.display()))
}

/// Ask for RGB at the requested size and rate, accepting whatever
/// supported layout the driver settles on.
fn configure(device: &v4l::Device, path: &Path, request: &StreamRequest) -> Result<Negotiated> {
    let mut format = device
        .format()
        .map_err(|e| unavailable(path, "read format", e))?;
    format.width = request.width;
    format.height = request.height;
    format.fourcc = v4l::FourCC::new(b"RGB3");

    let format = match device.set_format(&format) {
        Ok(format) => format,
        Err(e) => {
            warn!("failed to set format on {}: {e}", path.display());
            device
                .format()
                .map_err(|e| unavailable(path, "read format", e))?
        }
    };

    if request.fps >= 1.0 {
        let params = v4l::video::capture::Parameters::with_fps(request.fps.round() as u32);
        if let Err(e) = device.set_params(&params) {
            warn!("failed to set frame rate on {}: {e}", path.display());
        }
    }

    let layout = PixelLayout::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
        CameraError::DeviceUnavailable(format!(
            "{}: unsupported pixel format {}",
            path.display(),
            format.fourcc
        ))
    })?;
    Ok(Negotiated {
        width: format.width,
        height: format.height,
        layout,
    })
}

/// Capture thread body. Reports setup success or failure on `ready`, then
/// streams until `running` is cleared or the device fails.
fn capture(
    path: &Path,
    request: StreamRequest,
    buffer: &FrameBuffer,
    running: &AtomicBool,
    ready: SyncSender<Result<()>>,
) {
    let mut device = match v4l::Device::with_path(path) {
        Ok(device) => device,
        Err(e) => {
            let _ = ready.send(Err(unavailable(path, "open", e)));
            return;
        }
    };
    let negotiated = match configure(&device, path, &request) {
        Ok(negotiated) => negotiated,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let mut stream = match MmapStream::with_buffers(&mut device, Type::VideoCapture, MMAP_BUFFERS) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(unavailable(path, "start stream", e)));
            return;
        }
    };
    info!(
        "v4l2 capture on {} at {}x{} ({:?})",
        path.display(),
        negotiated.width,
        negotiated.height,
        negotiated.layout
    );
    let _ = ready.send(Ok(()));

    while running.load(Ordering::Acquire) {
        match stream.next() {
            Ok((data, _meta)) => {
                match negotiated
                    .layout
                    .to_frame(data, negotiated.width, negotiated.height)
                {
                    Some(frame) => buffer.push(frame),
                    None => debug!("dropped undecodable frame from {}", path.display()),
                }
            }
            Err(e) => {
                warn!("capture on {} failed: {e}", path.display());
                break;
            }
        }
    }
    debug!("v4l2 capture on {} released", path.display());
}
