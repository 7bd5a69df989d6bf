use evflow_frame::MessageReader;
use tracing::debug;

use crate::cmd::{open_input, InspectArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let (input, source) = open_input(&args.input)?;
    let reader = MessageReader::with_config(input, args.limits.frame_config());
    let limit = args.count.unwrap_or(usize::MAX);

    let mut seen = 0usize;
    for message in reader.take(limit) {
        let message = message.map_err(|err| frame_error("read failed", err))?;
        seen += 1;
        print_message(seen, &message, format);
    }

    debug!(source = %source, messages = seen, "inspect finished");
    Ok(SUCCESS)
}
