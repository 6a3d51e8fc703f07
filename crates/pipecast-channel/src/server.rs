use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, Once, PoisonError};

use pipecast_frame::{Codec, FrameConfig, JsonCodec};
use pipecast_transport::{PipeListener, PipeNamespace, MAX_INSTANCES};
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::{ChannelError, Result};
use crate::event::{ChannelEvent, Outcome};
use crate::listen;
use crate::subscription::{Observer, ObserverHandle, RawSubscription, Subscription};

/// Default server instance limit.
pub const DEFAULT_MAX_INSTANCES: u32 = 1;

/// Default number of messages buffered per subscriber before it lags.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Tuning for a channel server.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Maximum number of pending connections, in `[1, 254]`.
    pub max_instances: u32,
    /// Broadcast buffer per subscriber.
    pub capacity: usize,
    /// Message framing limits.
    pub frame: FrameConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_instances: DEFAULT_MAX_INSTANCES,
            capacity: DEFAULT_CAPACITY,
            frame: FrameConfig::default(),
        }
    }
}

/// Listener side of a named channel.
///
/// Creating a server is cheap and touches no OS resource. The endpoint is
/// bound by the first call to [`messages`](Self::messages),
/// [`messages_as_raw`](Self::messages_as_raw) or
/// [`subscribe`](Self::subscribe); all later subscriptions share the same
/// accept loop. The loop runs until the server's cancellation token trips or
/// a bind/transport fault ends it, and is never restarted.
///
/// Clones share the same listener. Dropping every clone does not stop a
/// running loop; call [`shutdown`](Self::shutdown) or cancel the token.
pub struct ChannelServer<T, C = JsonCodec> {
    shared: Arc<Shared>,
    codec: Arc<C>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ChannelServer<T, JsonCodec> {
    /// Create a JSON channel server for `name` with `max_instances` pending
    /// connections, in the environment's pipe namespace.
    pub fn create(name: impl Into<String>, max_instances: u32) -> Result<Self> {
        Self::builder(name).max_instances(max_instances).build()
    }

    /// Start configuring a channel server.
    pub fn builder(name: impl Into<String>) -> ChannelServerBuilder<T, JsonCodec> {
        ChannelServerBuilder {
            name: name.into(),
            namespace: None,
            config: ChannelConfig::default(),
            cancel: None,
            codec: JsonCodec,
            _marker: PhantomData,
        }
    }
}

impl<T, C: Codec> ChannelServer<T, C> {
    /// Typed view: every message that decodes as `T`.
    ///
    /// Messages that fail to decode are skipped without ending the
    /// subscription.
    pub fn messages(&self) -> Subscription<T, C>
    where
        T: DeserializeOwned,
    {
        Subscription::new(self.shared.subscribe(), Arc::clone(&self.codec))
    }

    /// Raw view: every non-blank message as framed.
    pub fn messages_as_raw(&self) -> RawSubscription {
        self.shared.subscribe()
    }

    /// Drive `observer` from its own task until the channel ends or the
    /// returned handle unsubscribes.
    pub fn subscribe<O>(&self, observer: O) -> ObserverHandle
    where
        T: DeserializeOwned + Send + 'static,
        O: Observer<T>,
    {
        ObserverHandle::spawn(self.messages(), observer)
    }

    /// Whether any listener is currently bound under `name` in the
    /// environment's pipe namespace. Advisory only.
    pub fn is_running(name: &str) -> bool {
        crate::probe::is_running(name)
    }

    /// The channel name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The configured instance limit.
    pub fn max_instances(&self) -> u32 {
        self.shared.config.max_instances
    }

    /// The namespace the endpoint is bound in.
    pub fn namespace(&self) -> &PipeNamespace {
        &self.shared.namespace
    }

    /// The codec used by the typed view.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Whether the first subscription has already started the listener.
    pub fn is_started(&self) -> bool {
        self.shared.start.is_completed()
    }

    /// The token that tears the listener down.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.shared.cancel
    }

    /// Request teardown. Subscribers observe normal completion.
    pub fn shutdown(&self) {
        self.shared.cancel.cancel();
    }
}

impl<T, C> Clone for ChannelServer<T, C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            codec: Arc::clone(&self.codec),
            _marker: PhantomData,
        }
    }
}

impl<T, C> fmt::Debug for ChannelServer<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelServer")
            .field("name", &self.shared.name)
            .field("namespace", &self.shared.namespace)
            .field("max_instances", &self.shared.config.max_instances)
            .field("started", &self.shared.start.is_completed())
            .finish()
    }
}

/// Builder for [`ChannelServer`].
pub struct ChannelServerBuilder<T, C = JsonCodec> {
    name: String,
    namespace: Option<PipeNamespace>,
    config: ChannelConfig,
    cancel: Option<CancellationToken>,
    codec: C,
    _marker: PhantomData<fn() -> T>,
}

impl<T, C: Codec> ChannelServerBuilder<T, C> {
    /// Maximum number of pending connections, in `[1, 254]`.
    pub fn max_instances(mut self, max_instances: u32) -> Self {
        self.config.max_instances = max_instances;
        self
    }

    /// Messages buffered per subscriber before it starts skipping.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Message framing limits.
    pub fn frame_config(mut self, frame: FrameConfig) -> Self {
        self.config.frame = frame;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Bind in an explicit namespace instead of the environment's.
    pub fn namespace(mut self, namespace: PipeNamespace) -> Self {
        self.namespace = Some(namespace);
        self
    }

    /// Tear the listener down when `cancel` trips.
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Decode the typed view with another codec.
    pub fn codec<C2: Codec>(self, codec: C2) -> ChannelServerBuilder<T, C2> {
        ChannelServerBuilder {
            name: self.name,
            namespace: self.namespace,
            config: self.config,
            cancel: self.cancel,
            codec,
            _marker: PhantomData,
        }
    }

    /// Validate the configuration. Allocates no OS resource.
    pub fn build(self) -> Result<ChannelServer<T, C>> {
        let max_instances = self.config.max_instances;
        if !(1..=MAX_INSTANCES).contains(&max_instances) {
            return Err(ChannelError::InvalidArgument {
                argument: "max_instances",
                reason: format!("must be between 1 and {MAX_INSTANCES}, got {max_instances}"),
            });
        }
        if self.config.capacity == 0 {
            return Err(ChannelError::InvalidArgument {
                argument: "capacity",
                reason: "must be greater than zero".to_string(),
            });
        }

        let namespace = self.namespace.unwrap_or_else(PipeNamespace::from_env);
        namespace
            .endpoint_path(&self.name)
            .map_err(|err| ChannelError::transport(&self.name, err))?;

        let (events, _) = broadcast::channel(self.config.capacity);
        let shared = Shared {
            name: self.name,
            namespace,
            config: self.config,
            cancel: self.cancel.unwrap_or_default(),
            start: Once::new(),
            gate: Mutex::new(Gate::Open(events)),
        };

        Ok(ChannelServer {
            shared: Arc::new(shared),
            codec: Arc::new(self.codec),
            _marker: PhantomData,
        })
    }
}

/// State shared by a server, its clones, and its accept loop.
pub(crate) struct Shared {
    pub(crate) name: String,
    pub(crate) namespace: PipeNamespace,
    pub(crate) config: ChannelConfig,
    pub(crate) cancel: CancellationToken,
    start: Once,
    gate: Mutex<Gate>,
}

/// Subscriptions attach to an open gate; once the loop has finished they get
/// its outcome directly.
enum Gate {
    Open(broadcast::Sender<ChannelEvent>),
    Closed(Outcome),
}

impl Shared {
    fn subscribe(self: &Arc<Self>) -> RawSubscription {
        let subscription = match &*self.lock_gate() {
            Gate::Open(events) => RawSubscription::live(&self.name, events.subscribe()),
            Gate::Closed(outcome) => RawSubscription::finished(&self.name, outcome.clone()),
        };
        self.start.call_once(|| self.start_listener());
        subscription
    }

    fn start_listener(self: &Arc<Self>) {
        if self.cancel.is_cancelled() {
            debug!(channel = %self.name, "cancelled before start; not binding");
            self.finish(Outcome::Completed);
            return;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                let err = ChannelError::NoRuntime {
                    name: self.name.clone(),
                };
                error!(channel = %self.name, %err, "cannot start channel");
                self.finish(Outcome::Failed(err));
                return;
            }
        };

        let listener =
            match PipeListener::bind(&self.namespace, &self.name, self.config.max_instances) {
                Ok(listener) => listener,
                Err(err) => {
                    let err = ChannelError::transport(&self.name, err);
                    error!(channel = %self.name, %err, "failed to bind channel");
                    self.finish(Outcome::Failed(err));
                    return;
                }
            };

        let events = match &*self.lock_gate() {
            Gate::Open(events) => events.clone(),
            Gate::Closed(_) => return,
        };
        runtime.spawn(listen::accept_loop(listener, Arc::clone(self), events));
    }

    /// Record the loop's outcome and announce it to every live subscriber.
    /// Only the first outcome counts.
    pub(crate) fn finish(&self, outcome: Outcome) {
        let mut gate = self.lock_gate();
        let Gate::Open(events) = &*gate else {
            return;
        };
        let _ = events.send(ChannelEvent::Finished(outcome.clone()));
        *gate = Gate::Closed(outcome);
    }

    fn lock_gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Server = ChannelServer<serde_json::Value>;

    fn temp_namespace(tag: &str) -> PipeNamespace {
        PipeNamespace::new(std::env::temp_dir().join(format!(
            "pcsrv-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        )))
    }

    #[test]
    fn create_accepts_full_instance_range() {
        for max in [1, 2, 127, 254] {
            let server = Server::create("range", max).expect("limit should be valid");
            assert_eq!(server.max_instances(), max);
        }
    }

    #[test]
    fn create_rejects_out_of_range_instances() {
        for max in [0, 255, 1000] {
            let err = Server::create("range", max).unwrap_err();
            assert!(
                matches!(
                    err,
                    ChannelError::InvalidArgument {
                        argument: "max_instances",
                        ..
                    }
                ),
                "{max} should be rejected, got {err}"
            );
        }
    }

    #[test]
    fn create_rejects_bad_names() {
        for name in ["", "  ", "a/b"] {
            let err = Server::create(name, 1).unwrap_err();
            assert!(matches!(
                err,
                ChannelError::InvalidArgument { argument: "name", .. }
            ));
        }
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = Server::builder("cap").capacity(0).build().unwrap_err();
        assert!(matches!(
            err,
            ChannelError::InvalidArgument {
                argument: "capacity",
                ..
            }
        ));
    }

    #[test]
    fn create_allocates_nothing() {
        let ns = temp_namespace("lazy");
        let server = Server::builder("lazy")
            .namespace(ns.clone())
            .max_instances(3)
            .build()
            .unwrap();

        assert!(!server.is_started());
        assert!(!ns.dir().exists(), "no namespace directory before subscribing");
        assert_eq!(server.name(), "lazy");
        assert_eq!(server.namespace(), &ns);
        assert_eq!(server.codec().name(), "json");
    }

    #[test]
    fn builder_uses_supplied_token() {
        let token = CancellationToken::new();
        let server = Server::builder("token")
            .cancellation(token.clone())
            .build()
            .unwrap();

        server.shutdown();
        assert!(token.is_cancelled());
        assert!(server.cancellation_token().is_cancelled());
    }

    #[test]
    fn subscribing_outside_runtime_fails_terminally() {
        let ns = temp_namespace("noruntime");
        let server = Server::builder("noruntime")
            .namespace(ns.clone())
            .build()
            .unwrap();
        let mut raw = server.messages_as_raw();
        assert!(server.is_started());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let first = runtime.block_on(raw.recv());
        assert!(matches!(first, Some(Err(ChannelError::NoRuntime { .. }))));
        assert!(runtime.block_on(raw.recv()).is_none());
        assert!(!ns.dir().exists());
    }

    #[tokio::test]
    async fn cancelled_before_start_never_binds() {
        let ns = temp_namespace("precancel");
        let server = Server::builder("precancel")
            .namespace(ns.clone())
            .build()
            .unwrap();
        server.shutdown();

        let mut raw = server.messages_as_raw();
        assert!(raw.recv().await.is_none());
        assert!(!ns.dir().exists());
    }
}
