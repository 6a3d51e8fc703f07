use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::UnixStream;

/// A connected pipe endpoint implementing `AsyncRead + AsyncWrite`.
///
/// This is the I/O type returned by [`PipeListener::accept`](crate::PipeListener::accept)
/// and [`connect`](crate::connect). Shutting down the write half is how a
/// sender marks its message complete.
pub struct PipeStream {
    inner: UnixStream,
}

impl PipeStream {
    pub(crate) fn from_unix(inner: UnixStream) -> Self {
        Self { inner }
    }

    /// Credentials of the connected peer as `(uid, gid, pid)`.
    ///
    /// The pid is only reported on platforms that expose it.
    pub fn peer_credentials(&self) -> Option<(u32, u32, Option<u32>)> {
        self.inner
            .peer_cred()
            .ok()
            .map(|cred| (cred.uid(), cred.gid(), cred.pid().map(|pid| pid as u32)))
    }
}

impl AsyncRead for PipeStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for PipeStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl std::fmt::Debug for PipeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeStream").field("type", &"unix").finish()
    }
}
