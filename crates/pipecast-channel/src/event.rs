use pipecast_frame::RawMessage;

use crate::error::ChannelError;

/// How a server's accept loop ended.
#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    /// Cancelled; normal completion.
    Completed,
    /// Bind or transport fault.
    Failed(ChannelError),
}

impl Outcome {
    /// The final item a subscriber yields for this outcome.
    pub(crate) fn into_item<T>(self) -> Option<Result<T, ChannelError>> {
        match self {
            Outcome::Completed => None,
            Outcome::Failed(err) => Some(Err(err)),
        }
    }
}

/// What the accept loop broadcasts to subscribers.
#[derive(Debug, Clone)]
pub(crate) enum ChannelEvent {
    Message(RawMessage),
    Finished(Outcome),
}
