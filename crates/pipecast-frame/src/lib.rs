//! Connection-delimited message framing for pipecast.
//!
//! One connection carries exactly one message. The sender writes the encoded
//! payload and half-closes its side; the receiver reads until end-of-stream.
//! The transport's close signal is the message boundary, so there is no
//! header, delimiter, or length prefix on the wire.
//!
//! Payloads are produced and consumed through a pluggable [`Codec`];
//! [`JsonCodec`] is the default.

pub mod codec;
pub mod config;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

pub use codec::{Codec, CodecError, JsonCodec};
pub use config::{FrameConfig, DEFAULT_MAX_MESSAGE_SIZE, READ_CHUNK_SIZE};
pub use error::{FrameError, Result};
pub use message::RawMessage;
pub use reader::MessageReader;
pub use writer::MessageWriter;
