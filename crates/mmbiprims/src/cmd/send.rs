use std::fs;
use std::sync::mpsc;
use std::time::Duration;

use mmbi_binding::{TagPolicy, TransportConfig};
use tracing::info;

use crate::cmd::{open_unix_transport, parse_duration, RunContext, SendArgs};
use crate::exit::{binding_error, io_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::print_message;

const POLL_IDLE: Duration = Duration::from_millis(5);

pub fn run(args: SendArgs, ctx: RunContext) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args)?;

    let config = TransportConfig::new(args.eid)
        .with_tag_policy(TagPolicy {
            tag_owner: true,
            tag: args.tag,
        })
        .with_debug(ctx.trace_messages);
    let transport = open_unix_transport(&args.local, &args.peer, config)?;

    let (tx, rx) = mpsc::channel::<(u8, Vec<u8>)>();
    if args.wait {
        transport.set_receive_callback(move |src, payload| {
            let _ = tx.send((src, payload.to_vec()));
        });
    }

    transport
        .send(args.dest, &payload)
        .map_err(|err| binding_error("send failed", err))?;
    info!(dest = args.dest, len = payload.len(), "message sent");

    if args.wait {
        let mut response = None;
        transport
            .poll_until(wait_timeout, POLL_IDLE, || {
                response = rx.try_recv().ok();
                response.is_some()
            })
            .map_err(|err| binding_error("receive failed", err))?;
        if let Some((src, payload)) = response {
            print_message(src, transport.local_id(), &payload, ctx.format);
        }
    }

    transport.destroy();
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
    Err(CliError::new(USAGE, "one of --data or --file is required"))
}
