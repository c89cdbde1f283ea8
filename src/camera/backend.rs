use crate::camera::error::{CameraError, Result};
use crate::camera::types::{MediaStream, StreamRequest};

/// Platform-agnostic camera backend trait.
///
/// Grants access to a capture device. `open` may block while the platform
/// negotiates access; callers run it off the async executor.
pub trait CameraBackend: Send + Sync {
    /// Open the default device and start its tracks.
    ///
    /// Fails with [`CameraError::DeviceUnavailable`] when access is denied or
    /// no device exists.
    fn open(&self, request: &StreamRequest) -> Result<MediaStream>;
}

/// Backend for hosts without a native camera integration.
pub struct NullBackend;

impl CameraBackend for NullBackend {
    fn open(&self, _request: &StreamRequest) -> Result<MediaStream> {
        Err(CameraError::DeviceUnavailable(
            "no camera device found".to_string(),
        ))
    }
}
