use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use mmbi_binding::{AdapterConfig, PollStatus, RetryPolicy, TransportConfig};
use tracing::{debug, info};

use crate::cmd::{open_unix_transport, parse_duration, ListenArgs, RunContext};
use crate::exit::{binding_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::print_message;

const OPEN_RETRY_DELAY: Duration = Duration::from_millis(100);
const POLL_IDLE: Duration = Duration::from_millis(5);

pub fn run(args: ListenArgs, ctx: RunContext) -> CliResult<i32> {
    let open_timeout = parse_duration(&args.open_timeout)?;
    let config = TransportConfig::new(args.eid)
        .with_adapter(AdapterConfig::default().with_open_retry(open_policy(open_timeout)))
        .with_debug(ctx.trace_messages);
    let transport = open_unix_transport(&args.local, &args.peer, config)?;
    info!(eid = args.eid, local = %args.local.display(), "listening");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let (tx, rx) = mpsc::channel::<(u8, Vec<u8>)>();
    transport.set_receive_callback(move |src, payload| {
        let _ = tx.send((src, payload.to_vec()));
    });

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let status = transport
            .poll()
            .map_err(|err| binding_error("receive failed", err))?;

        while let Ok((src, payload)) = rx.try_recv() {
            print_message(src, args.eid, &payload, ctx.format);
            if args.echo {
                transport
                    .send(src, &payload)
                    .map_err(|err| binding_error("echo failed", err))?;
                debug!(dest = src, len = payload.len(), "echoed");
            }
            printed = printed.saturating_add(1);

            if let Some(count) = args.count {
                if printed >= count {
                    transport.destroy();
                    return Ok(SUCCESS);
                }
            }
        }

        if status == PollStatus::NoData {
            std::thread::sleep(POLL_IDLE);
        }
    }

    transport.destroy();
    Ok(SUCCESS)
}

/// Spread `timeout` over fixed-delay open attempts.
fn open_policy(timeout: Duration) -> RetryPolicy {
    let attempts = timeout.as_millis() / OPEN_RETRY_DELAY.as_millis();
    let attempts = u32::try_from(attempts).unwrap_or(u32::MAX).max(1);
    RetryPolicy::new(attempts, OPEN_RETRY_DELAY)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
