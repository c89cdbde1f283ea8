use thiserror::Error;

/// Faults inside the streaming pipeline. None of these leave the pipeline's
/// own tasks; they are logged and counted.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Send attempted while the channel was not open; the frame is lost.
    #[error("channel not open (state: {0})")]
    Unavailable(String),

    /// Inbound message was not a well-formed detection result.
    #[error("malformed inbound message: {0}")]
    Parse(String),

    #[error("failed to encode outbound message: {0}")]
    Encode(String),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, ChannelError>;
