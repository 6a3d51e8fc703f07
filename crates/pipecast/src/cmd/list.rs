use crate::cmd::{Context, ListArgs};
use crate::exit::{CliError, CliResult, SUCCESS, TRANSPORT_ERROR};
use crate::output::print_channels;

pub fn run(_args: ListArgs, ctx: &Context) -> CliResult<i32> {
    let channels = ctx.namespace.list().map_err(|err| {
        CliError::new(
            TRANSPORT_ERROR,
            format!("listing {} failed: {err}", ctx.namespace.dir().display()),
        )
    })?;
    print_channels(ctx.namespace.dir(), &channels, ctx.format);
    Ok(SUCCESS)
}
