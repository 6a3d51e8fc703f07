//! Named local endpoints for pipecast.
//!
//! A channel name resolves to a Unix domain socket inside a per-user pipe
//! namespace directory. This crate owns that mapping and the three transport
//! operations the rest of pipecast needs:
//! - exclusive bind plus async accept ([`PipeListener`])
//! - one-shot async connect ([`connect`])
//! - enumerating bound endpoints ([`PipeNamespace::list`])
//!
//! Everything else builds on the [`PipeStream`] type provided here.

#[cfg(not(unix))]
compile_error!("pipecast-transport currently supports Unix targets only");

pub mod error;
pub mod namespace;
pub mod stream;
pub mod uds;

pub use error::{Result, TransportError};
pub use namespace::{validate_name, PipeNamespace, NAMESPACE_DIR_ENV};
pub use stream::PipeStream;
pub use uds::{connect, PipeListener, MAX_INSTANCES};
