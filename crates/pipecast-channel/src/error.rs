use std::sync::Arc;
use std::time::Duration;

use pipecast_frame::{CodecError, FrameError};
use pipecast_transport::TransportError;

/// Errors surfaced by channel servers, subscriptions, and senders.
///
/// Cloneable so one terminal error can be handed to every subscriber; the
/// underlying sources are shared.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    /// A constructor or send argument was rejected. Raised synchronously.
    #[error("invalid argument `{argument}`: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: String,
    },

    /// Another live listener owns the channel name.
    #[error("channel {name:?} is already bound by another listener")]
    BindConflict { name: String },

    /// The endpoint failed while binding, accepting, reading, or writing.
    #[error("transport fault on channel {name:?}: {source}")]
    TransportFault {
        name: String,
        source: Arc<TransportError>,
    },

    /// The value could not be encoded for sending.
    #[error("codec error: {0}")]
    Codec(#[source] Arc<CodecError>),

    /// No listener accepted the connection in time.
    #[error("no listener on channel {name:?} within {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    /// The caller's cancellation token tripped.
    #[error("operation cancelled")]
    Cancelled,

    /// The channel was started outside of a tokio runtime.
    #[error("channel {name:?} must be started from within a tokio runtime")]
    NoRuntime { name: String },
}

impl ChannelError {
    pub(crate) fn transport(name: &str, err: TransportError) -> Self {
        match err {
            TransportError::AlreadyBound { name } => ChannelError::BindConflict { name },
            TransportError::InvalidName { reason, .. } => ChannelError::InvalidArgument {
                argument: "name",
                reason: reason.to_string(),
            },
            err @ TransportError::PathTooLong { .. } => ChannelError::InvalidArgument {
                argument: "name",
                reason: err.to_string(),
            },
            other => ChannelError::TransportFault {
                name: name.to_string(),
                source: Arc::new(other),
            },
        }
    }

    pub(crate) fn frame(name: &str, err: FrameError) -> Self {
        match err {
            FrameError::Cancelled => ChannelError::Cancelled,
            FrameError::Io(io) => Self::transport(name, TransportError::Io(io)),
            err @ FrameError::MessageTooLarge { .. } => ChannelError::InvalidArgument {
                argument: "message",
                reason: err.to_string(),
            },
            other => Self::transport(
                name,
                TransportError::Io(std::io::Error::other(other.to_string())),
            ),
        }
    }

    /// True for errors that end a server for good (bind and transport faults).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChannelError::BindConflict { .. }
                | ChannelError::TransportFault { .. }
                | ChannelError::NoRuntime { .. }
        )
    }
}

impl From<CodecError> for ChannelError {
    fn from(err: CodecError) -> Self {
        ChannelError::Codec(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
