use std::time::Duration;

use pipecast_frame::{Codec, FrameConfig, JsonCodec, MessageWriter};
use pipecast_transport::{connect, PipeNamespace, PipeStream};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{ChannelError, Result};

/// Default pause between connection attempts while no listener is present.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Tuning for a [`ChannelClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Pause between connection attempts.
    pub retry_interval: Duration,
    /// Message framing limits.
    pub frame: FrameConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            frame: FrameConfig::default(),
        }
    }
}

/// Sender side of a channel: one connection per message.
#[derive(Debug, Clone)]
pub struct ChannelClient<C = JsonCodec> {
    namespace: PipeNamespace,
    codec: C,
    config: ClientConfig,
}

impl ChannelClient<JsonCodec> {
    /// A JSON client for the environment's pipe namespace.
    pub fn new() -> Self {
        Self::with_namespace(PipeNamespace::from_env())
    }

    /// A JSON client for an explicit pipe namespace.
    pub fn with_namespace(namespace: PipeNamespace) -> Self {
        Self {
            namespace,
            codec: JsonCodec,
            config: ClientConfig::default(),
        }
    }
}

impl Default for ChannelClient<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> ChannelClient<C> {
    /// Encode values with another codec.
    pub fn with_codec<C2: Codec>(self, codec: C2) -> ChannelClient<C2> {
        ChannelClient {
            namespace: self.namespace,
            codec,
            config: self.config,
        }
    }

    /// Replace the client configuration.
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// The namespace this client connects in.
    pub fn namespace(&self) -> &PipeNamespace {
        &self.namespace
    }

    /// Encode `value` and deliver it to the listener on `name`.
    ///
    /// Waits for a listener to appear for up to `timeout` (`None` waits
    /// forever). Nothing is connected if encoding fails.
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        let payload = self.codec.encode(value)?;
        self.send_raw(name, &payload, timeout, cancel).await
    }

    /// Deliver `payload` as-is to the listener on `name`.
    pub async fn send_raw(
        &self,
        name: &str,
        payload: &[u8],
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        if payload.len() > self.config.frame.max_message_size {
            return Err(ChannelError::InvalidArgument {
                argument: "message",
                reason: format!(
                    "{} bytes exceeds the {} byte limit",
                    payload.len(),
                    self.config.frame.max_message_size
                ),
            });
        }

        let never = CancellationToken::new();
        let cancel = cancel.unwrap_or(&never);

        let stream = self.connect(name, timeout, cancel).await?;
        let mut writer = MessageWriter::with_config(stream, self.config.frame.clone());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChannelError::Cancelled),
            written = writer.write_message(payload) => {
                written.map_err(|err| ChannelError::frame(name, err))?;
            }
        }

        debug!(channel = name, bytes = payload.len(), "message sent");
        Ok(())
    }

    async fn connect(
        &self,
        name: &str,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<PipeStream> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);

        loop {
            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ChannelError::Cancelled),
                attempt = connect(&self.namespace, name) => attempt,
            };

            let err = match attempt {
                Ok(stream) => return Ok(stream),
                Err(err) if err.is_listener_absent() => err,
                Err(err) => return Err(ChannelError::transport(name, err)),
            };

            let mut pause = self.config.retry_interval;
            if let (Some(deadline), Some(timeout)) = (deadline, timeout) {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    debug!(channel = name, ?timeout, "no listener before deadline");
                    return Err(ChannelError::Timeout {
                        name: name.to_string(),
                        timeout,
                    });
                }
                pause = pause.min(remaining);
            }

            trace!(channel = name, %err, ?pause, "listener not ready; retrying");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ChannelError::Cancelled),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}

/// Send `value` as JSON to the listener on `name` in the environment's pipe
/// namespace.
///
/// `timeout` bounds the wait for a listener (`None` waits forever); `cancel`
/// aborts the wait or the write.
pub async fn send<T: Serialize + ?Sized>(
    name: &str,
    value: &T,
    timeout: Option<Duration>,
    cancel: Option<&CancellationToken>,
) -> Result<()> {
    ChannelClient::new().send(name, value, timeout, cancel).await
}
