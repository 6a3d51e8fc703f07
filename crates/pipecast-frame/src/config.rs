use std::time::Duration;

/// Default maximum message size: 16 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Size of each read while assembling a message.
pub const READ_CHUNK_SIZE: usize = 256;

/// Configuration for message framing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum message size in bytes. Default: 16 MiB.
    pub max_message_size: usize,
    /// Deadline for a sender to complete its message. Default: none, a slow
    /// sender holds the connection until cancellation.
    pub read_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_timeout: None,
        }
    }
}
