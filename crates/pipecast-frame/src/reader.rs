use std::io::ErrorKind;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::config::{FrameConfig, READ_CHUNK_SIZE};
use crate::error::{FrameError, Result};
use crate::message::RawMessage;

const INITIAL_BUFFER_CAPACITY: usize = 4 * READ_CHUNK_SIZE;

/// Assembles the single message carried by one accepted connection.
///
/// Reads in fixed-size chunks until the sender half-closes; a message is
/// never assumed to arrive in one read.
pub struct MessageReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: AsyncRead + Unpin> MessageReader<T> {
    /// Create a new message reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new message reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read until the sender marks the message complete.
    ///
    /// Returns [`FrameError::Cancelled`] as soon as `cancel` trips; bytes
    /// read so far are discarded.
    pub async fn read_message(&mut self, cancel: &CancellationToken) -> Result<RawMessage> {
        let read_timeout = self.config.read_timeout;
        let max = self.config.max_message_size;
        let deadline = read_timeout.map(|timeout| Instant::now() + timeout);
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FrameError::Cancelled),
                _ = sleep_until(deadline) => {
                    return Err(FrameError::ReadTimeout(read_timeout.unwrap_or_default()));
                }
                read = self.inner.read(&mut chunk) => read,
            };

            let read = match read {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                let message = RawMessage::new(self.buf.split().freeze());
                trace!(bytes = message.len(), "message complete");
                return Ok(message);
            }

            let size = self.buf.len() + read;
            if size > max {
                self.buf.clear();
                return Err(FrameError::MessageTooLarge { size, max });
            }
            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current message reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use tokio::io::{AsyncWriteExt, ReadBuf};

    use super::*;

    #[tokio::test]
    async fn read_single_message() {
        let mut reader = MessageReader::new(&b"{\"action\":\"quit\"}"[..]);
        let message = reader.read_message(&CancellationToken::new()).await.unwrap();
        assert_eq!(message.text(), "{\"action\":\"quit\"}");
    }

    #[tokio::test]
    async fn read_empty_message() {
        let mut reader = MessageReader::new(&b""[..]);
        let message = reader.read_message(&CancellationToken::new()).await.unwrap();
        assert!(message.is_empty());
    }

    #[tokio::test]
    async fn message_spanning_many_chunks() {
        let payload: Vec<u8> = (0..5_000u32).map(|i| b'a' + (i % 26) as u8).collect();
        let (mut tx, rx) = tokio::io::duplex(64);

        let expected = payload.clone();
        let writer = tokio::spawn(async move {
            tx.write_all(&payload).await.unwrap();
            tx.shutdown().await.unwrap();
        });

        let mut reader = MessageReader::new(rx);
        let message = reader.read_message(&CancellationToken::new()).await.unwrap();
        writer.await.unwrap();

        assert_eq!(message.as_bytes(), expected.as_slice());
    }

    #[tokio::test]
    async fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: b"slow".to_vec(),
            pos: 0,
        };
        let mut reader = MessageReader::new(byte_reader);
        let message = reader.read_message(&CancellationToken::new()).await.unwrap();
        assert_eq!(message.as_bytes(), b"slow");
    }

    #[tokio::test]
    async fn interrupted_read_retries() {
        let reader = FailFirst {
            kind: ErrorKind::Interrupted,
            failed: false,
            bytes: b"ok".to_vec(),
        };
        let mut framed = MessageReader::new(reader);
        let message = framed.read_message(&CancellationToken::new()).await.unwrap();
        assert_eq!(message.as_bytes(), b"ok");
    }

    #[tokio::test]
    async fn read_error_propagates() {
        let reader = FailFirst {
            kind: ErrorKind::ConnectionReset,
            failed: false,
            bytes: b"never".to_vec(),
        };
        let mut framed = MessageReader::new(reader);
        let err = framed
            .read_message(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::ConnectionReset));
    }

    #[tokio::test]
    async fn oversized_message_rejected() {
        let cfg = FrameConfig {
            max_message_size: 300,
            ..FrameConfig::default()
        };
        let payload = vec![b'x'; 1024];
        let mut reader = MessageReader::with_config(payload.as_slice(), cfg);
        let err = reader
            .read_message(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::MessageTooLarge { max: 300, .. }));
    }

    #[tokio::test]
    async fn cancellation_interrupts_pending_read() {
        let (_tx, rx) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let mut reader = MessageReader::new(rx);
        let err = tokio::time::timeout(Duration::from_secs(2), reader.read_message(&cancel))
            .await
            .expect("read should unblock on cancellation")
            .unwrap_err();
        assert!(matches!(err, FrameError::Cancelled));
    }

    #[tokio::test]
    async fn read_timeout_applies_to_whole_message() {
        let (mut tx, rx) = tokio::io::duplex(64);
        tx.write_all(b"{\"partial\":").await.unwrap();

        let cfg = FrameConfig {
            read_timeout: Some(Duration::from_millis(20)),
            ..FrameConfig::default()
        };
        let mut reader = MessageReader::with_config(rx, cfg);
        let err = reader
            .read_message(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::ReadTimeout(d) if d == Duration::from_millis(20)));
        drop(tx);
    }

    #[tokio::test]
    async fn roundtrip_over_pipe_endpoint() {
        use pipecast_transport::{connect, PipeListener, PipeNamespace};

        let ns = PipeNamespace::new(std::env::temp_dir().join(format!(
            "pcframe-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        )));
        let listener = PipeListener::bind(&ns, "frames", 1).unwrap();

        let client_ns = ns.clone();
        let client = tokio::spawn(async move {
            let stream = connect(&client_ns, "frames").await.unwrap();
            let mut writer = crate::writer::MessageWriter::new(stream);
            writer.write_message(&vec![b'z'; 1000]).await.unwrap();
        });

        let stream = listener.accept().await.unwrap();
        let mut reader = MessageReader::new(stream);
        let message = reader.read_message(&CancellationToken::new()).await.unwrap();
        client.await.unwrap();

        assert_eq!(message.len(), 1000);
        drop(listener);
        let _ = std::fs::remove_dir_all(ns.dir());
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl AsyncRead for ByteByByteReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.pos < self.bytes.len() && buf.remaining() > 0 {
                let byte = self.bytes[self.pos];
                buf.put_slice(&[byte]);
                self.pos += 1;
            }
            Poll::Ready(Ok(()))
        }
    }

    struct FailFirst {
        kind: ErrorKind,
        failed: bool,
        bytes: Vec<u8>,
    }

    impl AsyncRead for FailFirst {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if !self.failed {
                self.failed = true;
                return Poll::Ready(Err(io::Error::from(self.kind)));
            }
            let n = self.bytes.len().min(buf.remaining());
            let chunk: Vec<u8> = self.bytes.drain(..n).collect();
            buf.put_slice(&chunk);
            Poll::Ready(Ok(()))
        }
    }
}
