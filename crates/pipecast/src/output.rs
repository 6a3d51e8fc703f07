use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A received message as `listen` prints it.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Decoded through the typed view.
    Json(serde_json::Value),
    /// Raw view text.
    Text(String),
}

impl Payload {
    fn display(&self) -> String {
        match self {
            Payload::Json(value) => value.to_string(),
            Payload::Text(text) => text.clone(),
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    channel: &'a str,
    size: usize,
    payload: serde_json::Value,
    timestamp: String,
}

pub fn print_message(channel: &str, payload: &Payload, format: OutputFormat) {
    let text = payload.display();
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                channel,
                size: text.len(),
                payload: match payload {
                    Payload::Json(value) => value.clone(),
                    Payload::Text(text) => serde_json::Value::String(text.clone()),
                },
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "SIZE", "PAYLOAD"])
                .add_row(vec![channel.to_string(), text.len().to_string(), text]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("channel={channel} size={} payload={text}", text.len());
        }
        OutputFormat::Raw => print_line(text.as_bytes()),
    }
}

#[derive(Serialize)]
struct ProbeOutput<'a> {
    channel: &'a str,
    running: bool,
}

pub fn print_probe(channel: &str, running: bool, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ProbeOutput { channel, running }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["CHANNEL", "RUNNING"])
                .add_row(vec![channel.to_string(), running.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let state = if running { "running" } else { "not running" };
            println!("{channel}: {state}");
        }
        OutputFormat::Raw => print_line(running.to_string().as_bytes()),
    }
}

#[derive(Serialize)]
struct ListOutput<'a> {
    pipe_dir: String,
    channels: &'a [String],
}

pub fn print_channels(pipe_dir: &std::path::Path, channels: &[String], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ListOutput {
            pipe_dir: pipe_dir.display().to_string(),
            channels,
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL).set_header(vec!["CHANNEL"]);
            for channel in channels {
                table.add_row(vec![channel.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for channel in channels {
                println!("{channel}");
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn print_line(data: &[u8]) {
    let mut out = std::io::stdout().lock();
    let _ = out.write_all(data);
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_display_keeps_json_compact() {
        let payload = Payload::Json(serde_json::json!({"action": "quit"}));
        assert_eq!(payload.display(), r#"{"action":"quit"}"#);
        assert_eq!(Payload::Text("plain".into()).display(), "plain");
    }
}
