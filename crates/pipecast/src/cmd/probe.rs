use pipecast_channel::is_running_in;

use crate::cmd::{Context, ProbeArgs};
use crate::exit::{CliResult, FAILURE, SUCCESS};
use crate::output::print_probe;

pub fn run(args: ProbeArgs, ctx: &Context) -> CliResult<i32> {
    let running = is_running_in(&ctx.namespace, &args.name);
    print_probe(&args.name, running, ctx.format);
    Ok(if running { SUCCESS } else { FAILURE })
}
