use pipecast_channel::{
    ChannelError, ChannelServer, CancellationToken, RawSubscription, Subscription,
};
use tracing::{error, info};

use crate::cmd::{Context, ListenArgs};
use crate::exit::{channel_error, CliResult, SUCCESS};
use crate::output::{print_message, Payload};

pub async fn run(args: ListenArgs, ctx: &Context) -> CliResult<i32> {
    let server: ChannelServer<serde_json::Value> = ChannelServer::builder(args.name.as_str())
        .namespace(ctx.namespace.clone())
        .max_instances(args.max_instances)
        .build()
        .map_err(|err| channel_error("listen failed", err))?;

    stop_on_ctrl_c(server.cancellation_token().clone());

    let mut feed = if args.raw {
        Feed::Raw(server.messages_as_raw())
    } else {
        Feed::Typed(server.messages())
    };
    info!(
        channel = %args.name,
        dir = %ctx.namespace.dir().display(),
        raw = args.raw,
        "waiting for messages"
    );

    let mut printed = 0usize;
    while let Some(item) = feed.next().await {
        let payload = item.map_err(|err| channel_error("listen failed", err))?;
        print_message(&args.name, &payload, ctx.format);
        printed = printed.saturating_add(1);

        if args.count.is_some_and(|count| printed >= count) {
            server.shutdown();
            break;
        }
    }

    // Completion is only announced once the endpoint is released.
    while feed.next().await.is_some() {}

    Ok(SUCCESS)
}

enum Feed {
    Typed(Subscription<serde_json::Value>),
    Raw(RawSubscription),
}

impl Feed {
    async fn next(&mut self) -> Option<Result<Payload, ChannelError>> {
        match self {
            Feed::Typed(messages) => Some(messages.recv().await?.map(Payload::Json)),
            Feed::Raw(messages) => Some(
                messages
                    .recv()
                    .await?
                    .map(|message| Payload::Text(message.text().into_owned())),
            ),
        }
    }
}

pub(crate) fn stop_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupted; shutting down");
                token.cancel();
            }
            Err(err) => error!(%err, "signal handler setup failed"),
        }
    });
}
