//! Subscriber-side views of a channel.
//!
//! Each subscription gets every message published after it subscribed, in
//! arrival order, followed by the channel's final outcome: `None` after a
//! normal shutdown, or one terminal `Err` and then `None` after a fault.
//! Dropping a subscription unsubscribes it.

use std::fmt;
use std::future::poll_fn;
use std::marker::PhantomData;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use futures_core::Stream;
use pipecast_frame::{Codec, JsonCodec, RawMessage};
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::{CancellationToken, ReusableBoxFuture};
use tracing::{debug, warn};

use crate::error::{ChannelError, Result};
use crate::event::{ChannelEvent, Outcome};

type Recv = (
    std::result::Result<ChannelEvent, RecvError>,
    broadcast::Receiver<ChannelEvent>,
);

async fn next_event(mut rx: broadcast::Receiver<ChannelEvent>) -> Recv {
    let result = rx.recv().await;
    (result, rx)
}

enum State {
    Live(ReusableBoxFuture<'static, Recv>),
    Pending(Outcome),
    Done,
}

/// Every non-blank message, undecoded.
pub struct RawSubscription {
    channel: String,
    state: State,
}

impl RawSubscription {
    pub(crate) fn live(channel: &str, rx: broadcast::Receiver<ChannelEvent>) -> Self {
        Self {
            channel: channel.to_string(),
            state: State::Live(ReusableBoxFuture::new(next_event(rx))),
        }
    }

    pub(crate) fn finished(channel: &str, outcome: Outcome) -> Self {
        Self {
            channel: channel.to_string(),
            state: State::Pending(outcome),
        }
    }

    /// The channel this subscription listens to.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next message.
    pub async fn recv(&mut self) -> Option<Result<RawMessage>> {
        poll_fn(|cx| self.poll_recv(cx)).await
    }

    /// Poll for the next message.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<RawMessage>>> {
        loop {
            let State::Live(next) = &mut self.state else {
                return match mem::replace(&mut self.state, State::Done) {
                    State::Pending(outcome) => Poll::Ready(outcome.into_item()),
                    _ => Poll::Ready(None),
                };
            };

            let (result, rx) = ready!(next.poll(cx));
            match result {
                Ok(ChannelEvent::Message(message)) => {
                    next.set(next_event(rx));
                    return Poll::Ready(Some(Ok(message)));
                }
                Ok(ChannelEvent::Finished(outcome)) => {
                    self.state = State::Done;
                    return Poll::Ready(outcome.into_item());
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "subscriber lagging; messages skipped");
                    next.set(next_event(rx));
                }
                Err(RecvError::Closed) => {
                    self.state = State::Done;
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl Stream for RawSubscription {
    type Item = Result<RawMessage>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_recv(cx)
    }
}

impl fmt::Debug for RawSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawSubscription")
            .field("channel", &self.channel)
            .field("done", &matches!(self.state, State::Done))
            .finish()
    }
}

/// Every message that decodes as `T`. Undecodable messages are skipped.
pub struct Subscription<T, C = JsonCodec> {
    raw: RawSubscription,
    codec: Arc<C>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned, C: Codec> Subscription<T, C> {
    pub(crate) fn new(raw: RawSubscription, codec: Arc<C>) -> Self {
        Self {
            raw,
            codec,
            _marker: PhantomData,
        }
    }

    /// The channel this subscription listens to.
    pub fn channel(&self) -> &str {
        self.raw.channel()
    }

    /// Wait for the next decodable message.
    pub async fn recv(&mut self) -> Option<Result<T>> {
        poll_fn(|cx| self.poll_recv(cx)).await
    }

    /// Poll for the next decodable message.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<T>>> {
        loop {
            let message = match ready!(self.raw.poll_recv(cx)) {
                Some(Ok(message)) => message,
                Some(Err(err)) => return Poll::Ready(Some(Err(err))),
                None => return Poll::Ready(None),
            };
            match self.codec.decode::<T>(message.as_bytes()) {
                Ok(value) => return Poll::Ready(Some(Ok(value))),
                Err(err) => debug!(
                    channel = %self.raw.channel,
                    codec = self.codec.name(),
                    bytes = message.len(),
                    %err,
                    "skipping message that does not decode"
                ),
            }
        }
    }

    /// Drop the decoding and see every message as framed.
    pub fn into_raw(self) -> RawSubscription {
        self.raw
    }
}

impl<T: DeserializeOwned, C: Codec> Stream for Subscription<T, C> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_recv(cx)
    }
}

impl<T, C> fmt::Debug for Subscription<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("raw", &self.raw)
            .finish_non_exhaustive()
    }
}

/// Callback-style consumer for [`ChannelServer::subscribe`](crate::ChannelServer::subscribe).
///
/// Any `FnMut(T) + Send + 'static` closure is an observer that ignores errors
/// and completion.
pub trait Observer<T>: Send + 'static {
    /// A message arrived.
    fn on_next(&mut self, value: T);

    /// The channel ended with a terminal error. No further calls follow.
    fn on_error(&mut self, error: ChannelError) {
        let _ = error;
    }

    /// The channel shut down normally. No further calls follow.
    fn on_completed(&mut self) {}
}

impl<T, F> Observer<T> for F
where
    F: FnMut(T) + Send + 'static,
{
    fn on_next(&mut self, value: T) {
        self(value)
    }
}

/// Handle to an observer task.
///
/// Dropping the handle leaves the observer running; call
/// [`unsubscribe`](Self::unsubscribe) to detach it.
#[derive(Debug)]
pub struct ObserverHandle {
    detach: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ObserverHandle {
    pub(crate) fn spawn<T, C, O>(mut messages: Subscription<T, C>, mut observer: O) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        C: Codec,
        O: Observer<T>,
    {
        let detach = CancellationToken::new();

        let Ok(runtime) = Handle::try_current() else {
            observer.on_error(ChannelError::NoRuntime {
                name: messages.channel().to_string(),
            });
            return Self { detach, task: None };
        };

        let stop = detach.clone();
        let channel = messages.channel().to_string();
        let task = runtime.spawn(async move {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = stop.cancelled() => {
                        debug!(%channel, "observer unsubscribed");
                        return;
                    }
                    next = messages.recv() => next,
                };
                match next {
                    Some(Ok(value)) => observer.on_next(value),
                    Some(Err(err)) => return observer.on_error(err),
                    None => return observer.on_completed(),
                }
            }
        });

        Self {
            detach,
            task: Some(task),
        }
    }

    /// Stop delivering to this observer. Other subscribers are unaffected.
    pub fn unsubscribe(&self) {
        self.detach.cancel();
    }

    /// True once the observer will receive no further calls.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the observer task to end. Fails if the observer panicked.
    pub async fn join(mut self) -> std::result::Result<(), JoinError> {
        match self.task.take() {
            Some(task) => task.await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use futures_util::StreamExt;
    use pipecast_transport::TransportError;

    use super::*;

    fn fault() -> ChannelError {
        ChannelError::TransportFault {
            name: "t".to_string(),
            source: Arc::new(TransportError::Accept(std::io::Error::from(
                std::io::ErrorKind::Other,
            ))),
        }
    }

    fn live() -> (broadcast::Sender<ChannelEvent>, RawSubscription) {
        let (tx, rx) = broadcast::channel(16);
        (tx, RawSubscription::live("t", rx))
    }

    fn message(text: &'static str) -> ChannelEvent {
        ChannelEvent::Message(RawMessage::from(text))
    }

    #[tokio::test]
    async fn delivers_messages_then_completes() {
        let (tx, mut raw) = live();
        tx.send(message("one")).unwrap();
        tx.send(message("two")).unwrap();
        tx.send(ChannelEvent::Finished(Outcome::Completed)).unwrap();

        assert_eq!(raw.recv().await.unwrap().unwrap().text(), "one");
        assert_eq!(raw.recv().await.unwrap().unwrap().text(), "two");
        assert!(raw.recv().await.is_none());
        assert!(raw.recv().await.is_none());
    }

    #[tokio::test]
    async fn failure_is_yielded_once() {
        let (tx, mut raw) = live();
        tx.send(ChannelEvent::Finished(Outcome::Failed(fault())))
            .unwrap();

        assert!(matches!(
            raw.recv().await,
            Some(Err(ChannelError::TransportFault { .. }))
        ));
        assert!(raw.recv().await.is_none());
    }

    #[tokio::test]
    async fn finished_subscription_yields_outcome_immediately() {
        let mut raw = RawSubscription::finished("t", Outcome::Failed(fault()));
        assert!(matches!(raw.recv().await, Some(Err(_))));
        assert!(raw.recv().await.is_none());

        let mut raw = RawSubscription::finished("t", Outcome::Completed);
        assert!(raw.recv().await.is_none());
    }

    #[tokio::test]
    async fn closed_sender_ends_stream() {
        let (tx, mut raw) = live();
        drop(tx);
        assert!(raw.recv().await.is_none());
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_and_continues() {
        let (tx, rx) = broadcast::channel(2);
        let mut raw = RawSubscription::live("t", rx);
        for text in ["a", "b", "c", "d"] {
            tx.send(message(text)).unwrap();
        }

        assert_eq!(raw.recv().await.unwrap().unwrap().text(), "c");
        assert_eq!(raw.recv().await.unwrap().unwrap().text(), "d");
    }

    #[tokio::test]
    async fn typed_view_skips_undecodable() {
        let (tx, raw) = live();
        let mut typed: Subscription<u32> = Subscription::new(raw, Arc::new(JsonCodec));
        tx.send(message("not json")).unwrap();
        tx.send(message("7")).unwrap();
        tx.send(ChannelEvent::Finished(Outcome::Completed)).unwrap();

        assert_eq!(typed.recv().await.unwrap().unwrap(), 7);
        assert!(typed.recv().await.is_none());
    }

    #[tokio::test]
    async fn subscription_is_a_stream() {
        let (tx, raw) = live();
        let typed: Subscription<String> = Subscription::new(raw, Arc::new(JsonCodec));
        tx.send(message("\"x\"")).unwrap();
        tx.send(message("\"y\"")).unwrap();
        tx.send(ChannelEvent::Finished(Outcome::Completed)).unwrap();

        let values: Vec<String> = typed.map(|item| item.unwrap()).collect().await;
        assert_eq!(values, ["x", "y"]);
    }

    #[derive(Default)]
    struct Recording {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Observer<u32> for Recording {
        fn on_next(&mut self, value: u32) {
            self.log.lock().unwrap().push(value.to_string());
        }

        fn on_error(&mut self, error: ChannelError) {
            self.log.lock().unwrap().push(format!("error: {error}"));
        }

        fn on_completed(&mut self) {
            self.log.lock().unwrap().push("completed".to_string());
        }
    }

    #[tokio::test]
    async fn observer_sees_values_then_completion() {
        let (tx, raw) = live();
        let recording = Recording::default();
        let log = Arc::clone(&recording.log);
        let handle =
            ObserverHandle::spawn(Subscription::<u32>::new(raw, Arc::new(JsonCodec)), recording);

        tx.send(message("1")).unwrap();
        tx.send(message("2")).unwrap();
        tx.send(ChannelEvent::Finished(Outcome::Completed)).unwrap();
        handle.join().await.unwrap();

        assert_eq!(*log.lock().unwrap(), ["1", "2", "completed"]);
    }

    #[tokio::test]
    async fn observer_sees_terminal_error() {
        let (tx, raw) = live();
        let recording = Recording::default();
        let log = Arc::clone(&recording.log);
        let handle =
            ObserverHandle::spawn(Subscription::<u32>::new(raw, Arc::new(JsonCodec)), recording);

        tx.send(ChannelEvent::Finished(Outcome::Failed(fault())))
            .unwrap();
        handle.join().await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].starts_with("error: transport fault"));
    }

    #[tokio::test]
    async fn unsubscribed_observer_stops() {
        let (tx, raw) = live();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = ObserverHandle::spawn(
            Subscription::<u32>::new(raw, Arc::new(JsonCodec)),
            move |value: u32| sink.lock().unwrap().push(value),
        );

        handle.unsubscribe();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !handle.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("observer should stop after unsubscribe");

        let _ = tx.send(message("9"));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(tx.receiver_count(), 0);
    }

    #[test]
    fn observer_without_runtime_gets_error() {
        let (_tx, raw) = live();
        let recording = Recording::default();
        let log = Arc::clone(&recording.log);
        let handle =
            ObserverHandle::spawn(Subscription::<u32>::new(raw, Arc::new(JsonCodec)), recording);

        assert!(handle.is_finished());
        assert!(log.lock().unwrap()[0].contains("tokio runtime"));
    }
}
