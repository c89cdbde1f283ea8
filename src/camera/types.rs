use std::fmt;
use std::sync::Arc;

use crate::preview::capture::FrameBuffer;

/// Stable camera identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a new `DeviceId` from a raw string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Requested stream shape. Backends may deliver a different native
/// resolution; consumers always read dimensions from the frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamRequest {
    pub width: u32,
    pub height: u32,
    pub fps: f32,
}

impl Default for StreamRequest {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30.0,
        }
    }
}

/// One producing track of an open device.
pub trait VideoTrack: Send {
    /// Human-readable label, used in logs.
    fn label(&self) -> &str;

    /// Halt the track and release its share of the device. Idempotent.
    fn stop(&mut self);
}

/// An open device: its tracks plus the buffer they write into.
pub struct MediaStream {
    pub device: DeviceId,
    pub tracks: Vec<Box<dyn VideoTrack>>,
    pub buffer: Arc<FrameBuffer>,
}

impl MediaStream {
    /// Halt every track individually.
    pub fn stop_all(&mut self) {
        for track in &mut self.tracks {
            track.stop();
            tracing::debug!("stopped track '{}' on {}", track.label(), self.device);
        }
    }
}
