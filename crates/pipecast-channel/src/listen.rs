use std::sync::Arc;

use pipecast_frame::{FrameError, MessageReader};
use pipecast_transport::{PipeListener, PipeStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use crate::error::ChannelError;
use crate::event::{ChannelEvent, Outcome};
use crate::server::Shared;

/// Accept connections one at a time and publish each connection's message.
///
/// Runs until the server's token trips (normal completion) or the endpoint
/// faults (terminal error). The endpoint is released before subscribers are
/// told the outcome.
pub(crate) async fn accept_loop(
    listener: PipeListener,
    shared: Arc<Shared>,
    events: broadcast::Sender<ChannelEvent>,
) {
    let outcome = serve(&listener, &shared, &events).await;
    drop(listener);

    match &outcome {
        Outcome::Completed => info!(channel = %shared.name, "channel stopped"),
        Outcome::Failed(err) => error!(channel = %shared.name, %err, "channel failed"),
    }
    shared.finish(outcome);
}

async fn serve(
    listener: &PipeListener,
    shared: &Shared,
    events: &broadcast::Sender<ChannelEvent>,
) -> Outcome {
    let cancel = &shared.cancel;

    loop {
        let accepted = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Outcome::Completed,
            accepted = listener.accept() => accepted,
        };

        let stream = match accepted {
            Ok(stream) => stream,
            Err(err) => return Outcome::Failed(ChannelError::transport(&shared.name, err)),
        };
        log_peer(&shared.name, &stream);

        let mut reader = MessageReader::with_config(stream, shared.config.frame.clone());
        let message = match reader.read_message(cancel).await {
            Ok(message) => message,
            Err(FrameError::Cancelled) => return Outcome::Completed,
            Err(FrameError::MessageTooLarge { size, max }) => {
                warn!(channel = %shared.name, size, max, "dropping oversized message");
                continue;
            }
            Err(FrameError::ReadTimeout(timeout)) => {
                warn!(channel = %shared.name, ?timeout, "dropping message: sender too slow");
                continue;
            }
            Err(err) => return Outcome::Failed(ChannelError::frame(&shared.name, err)),
        };

        if message.is_blank() {
            trace!(channel = %shared.name, "skipping blank message");
            continue;
        }

        let bytes = message.len();
        match events.send(ChannelEvent::Message(message)) {
            Ok(receivers) => debug!(channel = %shared.name, bytes, receivers, "message published"),
            Err(_) => debug!(channel = %shared.name, bytes, "message dropped: no subscribers"),
        }
    }
}

fn log_peer(channel: &str, stream: &PipeStream) {
    match stream.peer_credentials() {
        Some((uid, gid, pid)) => debug!(channel, uid, gid, ?pid, "connection accepted"),
        None => debug!(channel, "connection accepted"),
    }
}
