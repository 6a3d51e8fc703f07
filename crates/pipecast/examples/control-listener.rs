//! Owns a control channel and reacts to commands until told to quit.
//!
//! Run with:
//!   cargo run --example control-listener --features cli
//!
//! In another terminal:
//!   cargo run --features cli -- send demo-control --json '{"action":"ping"}'
//!   cargo run --features cli -- send demo-control --json '{"action":"quit"}'

use pipecast::channel::ChannelServer;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Command {
    action: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = ChannelServer::<Command>::create("demo-control", 1)?;
    let mut commands = server.messages();
    eprintln!(
        "Listening on demo-control in {}",
        server.namespace().dir().display()
    );

    while let Some(command) = commands.recv().await {
        let command = command?;
        eprintln!("Received {:?}", command.action);
        if command.action == "quit" {
            server.shutdown();
        }
    }

    eprintln!("Channel closed");
    Ok(())
}
