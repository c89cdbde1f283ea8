use thiserror::Error;

/// Camera subsystem errors.
#[derive(Debug, Error)]
pub enum CameraError {
    /// Access was denied or no usable device exists.
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("camera backend failure: {0}")]
    Backend(String),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, CameraError>;
