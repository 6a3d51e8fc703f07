//! Named-pipe message channels with broadcast fan-out.
//!
//! A process owns a named channel and receives every message other processes
//! send to it; each message is fanned out to all of the owner's subscribers.
//!
//! # Crate Structure
//!
//! - [`transport`]: pipe namespace, exclusive endpoint binding, connect
//! - [`frame`]: one-message-per-connection framing and payload codecs
//! - [`channel`]: channel server, subscriptions, client and probe

/// Re-export transport types.
pub mod transport {
    pub use pipecast_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use pipecast_frame::*;
}

/// Re-export channel types.
pub mod channel {
    pub use pipecast_channel::*;
}

pub use pipecast_channel::{
    is_running, send, ChannelClient, ChannelError, ChannelServer, Observer, RawSubscription,
    Subscription,
};
