//! Named-pipe message channel.
//!
//! A [`ChannelServer`] owns one named endpoint. The first subscription binds
//! it and starts a single accept loop; every accepted connection carries one
//! message, which is published to all current subscribers. Senders use
//! [`send`] (or a [`ChannelClient`]) to connect, write one message, and go.
//!
//! ```no_run
//! use pipecast_channel::{send, ChannelServer};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Command {
//!     action: String,
//! }
//!
//! # async fn demo() -> pipecast_channel::Result<()> {
//! let server = ChannelServer::<Command>::create("app-control", 1)?;
//! let mut commands = server.messages();
//!
//! send("app-control", &Command { action: "quit".into() }, None, None).await?;
//!
//! while let Some(command) = commands.recv().await {
//!     println!("{:?}", command?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
mod event;
mod listen;
pub mod probe;
pub mod server;
pub mod subscription;

pub use client::{send, ChannelClient, ClientConfig, DEFAULT_RETRY_INTERVAL};
pub use error::{ChannelError, Result};
pub use probe::{is_running, is_running_in};
pub use server::{
    ChannelConfig, ChannelServer, ChannelServerBuilder, DEFAULT_CAPACITY, DEFAULT_MAX_INSTANCES,
};
pub use subscription::{Observer, ObserverHandle, RawSubscription, Subscription};

pub use pipecast_frame::{Codec, CodecError, FrameConfig, JsonCodec, RawMessage};
pub use pipecast_transport::{PipeNamespace, MAX_INSTANCES};
pub use tokio_util::sync::CancellationToken;
