use std::path::PathBuf;

use clap::{ArgGroup, Args, Subcommand};
use pipecast_channel::{PipeNamespace, DEFAULT_MAX_INSTANCES};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod list;
pub mod listen;
pub mod probe;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Own a channel and print every message sent to it.
    Listen(ListenArgs),
    /// Send a single message to a channel.
    Send(SendArgs),
    /// Check whether a listener is bound to a channel.
    Probe(ProbeArgs),
    /// List the channels bound in the pipe directory.
    List(ListArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub format: OutputFormat,
    pub namespace: PipeNamespace,
}

pub async fn run(command: Command, ctx: &Context) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, ctx).await,
        Command::Send(args) => send::run(args, ctx).await,
        Command::Probe(args) => probe::run(args, ctx),
        Command::List(args) => list::run(args, ctx),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Channel name to own.
    pub name: String,
    /// Pending connection limit (1-254).
    #[arg(long, default_value_t = DEFAULT_MAX_INSTANCES)]
    pub max_instances: u32,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Print messages as received instead of decoding them as JSON.
    #[arg(long)]
    pub raw: bool,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("payload").required(true).args(["json", "data", "file"])))]
pub struct SendArgs {
    /// Channel name to send to.
    pub name: String,
    /// JSON payload.
    #[arg(long)]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long)]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// How long to wait for a listener (e.g. 5s, 500ms, infinite).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Channel name (or part of one) to look for.
    pub name: String,
}

#[derive(Args, Debug, Default)]
pub struct ListArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
