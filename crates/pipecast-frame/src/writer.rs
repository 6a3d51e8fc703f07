use std::io::ErrorKind;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::config::FrameConfig;
use crate::error::{FrameError, Result};

/// Writes one complete message and marks it complete by half-closing.
pub struct MessageWriter<T> {
    inner: T,
    config: FrameConfig,
}

impl<T: AsyncWrite + Unpin> MessageWriter<T> {
    /// Create a new message writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new message writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Write all of `payload`, flush, and shut down the write half.
    ///
    /// After this returns the connection carries no further messages.
    pub async fn write_message(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_message_size {
            return Err(FrameError::MessageTooLarge {
                size: payload.len(),
                max: self.config.max_message_size,
            });
        }

        let mut offset = 0usize;
        while offset < payload.len() {
            match self.inner.write(&payload[offset..]).await {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.inner.flush().await?;
        self.inner.shutdown().await?;
        Ok(())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current message writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
