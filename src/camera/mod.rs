// Camera domain: device access and the capture session lifecycle.

pub mod backend;
pub mod dummy;
pub mod error;
pub mod source;
pub mod types;
#[cfg(all(feature = "camera-v4l2", target_os = "linux"))]
pub mod v4l2;
