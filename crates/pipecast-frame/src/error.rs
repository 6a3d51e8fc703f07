use std::time::Duration;

/// Errors that can occur while framing a message.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The message exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The sender did not complete its message in time.
    #[error("message not completed within {0:?}")]
    ReadTimeout(Duration),

    /// Framing was abandoned because cancellation was requested.
    #[error("framing cancelled")]
    Cancelled,

    /// The peer stopped accepting bytes before the message was written.
    #[error("connection closed (incomplete message)")]
    ConnectionClosed,

    /// An I/O error occurred while reading or writing the message.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
