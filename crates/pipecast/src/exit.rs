use std::fmt;
use std::io;

use pipecast_channel::ChannelError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => USAGE,
        io::ErrorKind::TimedOut => TIMEOUT,
        _ => FAILURE,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    let code = match &err {
        ChannelError::InvalidArgument {
            argument: "message",
            ..
        } => DATA_INVALID,
        ChannelError::InvalidArgument { .. } => USAGE,
        ChannelError::BindConflict { .. } | ChannelError::TransportFault { .. } => {
            TRANSPORT_ERROR
        }
        ChannelError::Codec(_) => DATA_INVALID,
        ChannelError::Timeout { .. } => TIMEOUT,
        ChannelError::Cancelled => FAILURE,
        ChannelError::NoRuntime { .. } => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}
