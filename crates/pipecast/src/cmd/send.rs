use std::fs;
use std::time::Duration;

use pipecast_channel::{CancellationToken, ChannelClient};
use tracing::debug;

use crate::cmd::listen::stop_on_ctrl_c;
use crate::cmd::{Context, SendArgs};
use crate::exit::{channel_error, io_error, CliError, CliResult, SUCCESS, USAGE};

pub async fn run(args: SendArgs, ctx: &Context) -> CliResult<i32> {
    let timeout = parse_timeout(&args.timeout)?;
    let cancel = CancellationToken::new();
    stop_on_ctrl_c(cancel.clone());

    let client = ChannelClient::with_namespace(ctx.namespace.clone());
    let sent = if let Some(json) = &args.json {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        client.send(&args.name, &value, timeout, Some(&cancel)).await
    } else {
        let payload = resolve_payload(&args)?;
        client
            .send_raw(&args.name, &payload, timeout, Some(&cancel))
            .await
    };
    sent.map_err(|err| channel_error("send failed", err))?;

    debug!(channel = %args.name, "delivered");
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Err(CliError::new(
        USAGE,
        "one of --json, --data or --file is required",
    ))
}

/// `None` waits for a listener indefinitely.
fn parse_timeout(input: &str) -> CliResult<Option<Duration>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
    }
    if input.eq_ignore_ascii_case("infinite") {
        return Ok(None);
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    Ok(Some(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    }))
}
