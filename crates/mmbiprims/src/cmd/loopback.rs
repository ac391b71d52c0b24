use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mmbi_binding::{
    AdapterConfig, AdapterStats, PollStatus, RetryPolicy, TransportConfig, TransportContext,
};
use mmbi_channel::{DuplexChannel, Side};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cmd::{parse_duration, LoopbackArgs, RunContext, BMC_EID, HOST_EID};
use crate::exit::{
    binding_error, channel_error, CliError, CliResult, DATA_INVALID, SUCCESS, TIMEOUT, USAGE,
};
use crate::output::print_report;

const HOST_TAG: u8 = 1;
const BMC_TAG: u8 = 2;
const START_MARKER: u8 = 0xAA;
const END_MARKER: u8 = 0xBB;

#[derive(Default)]
struct Tally {
    verified: AtomicU32,
    corrupt: AtomicU32,
}

impl Tally {
    fn received(&self) -> u32 {
        self.verified.load(Ordering::Relaxed) + self.corrupt.load(Ordering::Relaxed)
    }
}

#[derive(Serialize)]
struct DirectionReport {
    sent: u32,
    verified: u32,
    corrupt: u32,
    frames_sent: u64,
    frames_received: u64,
}

#[derive(Serialize)]
struct LoopbackReport {
    size: usize,
    count: u32,
    mtu: usize,
    capacity: usize,
    host_to_bmc: DirectionReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    bmc_to_host: Option<DirectionReport>,
    elapsed_ms: u64,
    passed: bool,
}

impl LoopbackReport {
    fn rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![
            ("size", self.size.to_string()),
            ("count", self.count.to_string()),
            ("mtu", self.mtu.to_string()),
            ("host_to_bmc", direction_summary(&self.host_to_bmc)),
        ];
        if let Some(back) = &self.bmc_to_host {
            rows.push(("bmc_to_host", direction_summary(back)));
        }
        rows.push(("elapsed_ms", self.elapsed_ms.to_string()));
        rows.push(("passed", self.passed.to_string()));
        rows
    }
}

fn direction_summary(report: &DirectionReport) -> String {
    format!(
        "{}/{} verified, {} corrupt, {} frames",
        report.verified, report.sent, report.corrupt, report.frames_received
    )
}

/// Test message: a repeating byte ramp bracketed by start and end markers.
pub(crate) fn pattern(size: usize) -> Vec<u8> {
    let mut buf: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    if let Some(first) = buf.first_mut() {
        *first = START_MARKER;
    }
    if let Some(last) = buf.last_mut() {
        *last = END_MARKER;
    }
    buf
}

fn verifier(
    expected_src: u8,
    expected: Arc<Vec<u8>>,
    tally: Arc<Tally>,
) -> impl Fn(u8, &[u8]) + Send + Sync {
    move |src, payload| {
        if src == expected_src && payload == expected.as_slice() {
            tally.verified.fetch_add(1, Ordering::Relaxed);
        } else {
            warn!(
                src,
                len = payload.len(),
                first = payload.first().copied(),
                last = payload.last().copied(),
                "loopback message failed verification"
            );
            tally.corrupt.fetch_add(1, Ordering::Relaxed);
        }
    }
}

pub fn run(args: LoopbackArgs, ctx: RunContext) -> CliResult<i32> {
    if args.size < 2 {
        return Err(CliError::new(USAGE, "--size must be at least 2 bytes"));
    }
    if args.count == 0 {
        return Err(CliError::new(USAGE, "--count must be greater than zero"));
    }
    let timeout = parse_duration(&args.timeout)?;

    let duplex =
        DuplexChannel::new(args.capacity).map_err(|err| channel_error("device setup failed", err))?;
    let adapter = AdapterConfig::default()
        .with_max_frame_size(args.mtu)
        .with_tx_retry(RetryPolicy::immediate(1));

    let host = TransportContext::init(
        &duplex.opener(Side::A),
        TransportConfig::new(HOST_EID)
            .with_adapter(adapter.clone())
            .with_debug(ctx.trace_messages),
    )
    .map_err(|err| binding_error("host init failed", err))?;
    let bmc = TransportContext::init(
        &duplex.opener(Side::B),
        TransportConfig::new(BMC_EID)
            .with_adapter(adapter)
            .with_debug(ctx.trace_messages),
    )
    .map_err(|err| binding_error("bmc init failed", err))?;

    let message = Arc::new(pattern(args.size));
    let at_bmc = Arc::new(Tally::default());
    let at_host = Arc::new(Tally::default());
    bmc.set_receive_callback(verifier(HOST_EID, message.clone(), at_bmc.clone()));
    host.set_receive_callback(verifier(BMC_EID, message.clone(), at_host.clone()));

    info!(
        size = args.size,
        count = args.count,
        duplex = args.duplex,
        mtu = args.mtu,
        "starting loopback"
    );

    let started = Instant::now();
    let deadline = started + timeout;
    let mut timed_out = false;

    'rounds: for round in 1..=args.count {
        host.send_with_tag(BMC_EID, true, HOST_TAG, message.as_slice())
            .map_err(|err| binding_error("host send failed", err))?;
        if args.duplex {
            bmc.send_with_tag(HOST_EID, true, BMC_TAG, message.as_slice())
                .map_err(|err| binding_error("bmc send failed", err))?;
        }

        loop {
            let bmc_done = at_bmc.received() >= round;
            let host_done = !args.duplex || at_host.received() >= round;
            if bmc_done && host_done {
                break;
            }
            if Instant::now() >= deadline {
                timed_out = true;
                break 'rounds;
            }

            let from_host = bmc.poll().map_err(|err| binding_error("bmc receive failed", err))?;
            let from_bmc = host.poll().map_err(|err| binding_error("host receive failed", err))?;
            if from_host == PollStatus::NoData && from_bmc == PollStatus::NoData {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        debug!(round, "loopback round complete");
    }

    let elapsed = started.elapsed();
    let (host_stats, bmc_stats) = (host.stats(), bmc.stats());
    bmc.destroy();
    host.destroy();

    let host_to_bmc = direction_report(args.count, &at_bmc, &host_stats, &bmc_stats);
    let bmc_to_host = args
        .duplex
        .then(|| direction_report(args.count, &at_host, &bmc_stats, &host_stats));
    let passed = !timed_out
        && host_to_bmc.verified == args.count
        && bmc_to_host.as_ref().is_none_or(|r| r.verified == args.count);

    let report = LoopbackReport {
        size: args.size,
        count: args.count,
        mtu: args.mtu,
        capacity: args.capacity,
        host_to_bmc,
        bmc_to_host,
        elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        passed,
    };
    print_report(&report, &report.rows(), ctx.format);

    if timed_out {
        return Err(CliError::new(
            TIMEOUT,
            format!("loopback did not complete within {timeout:?}"),
        ));
    }
    if !passed {
        return Err(CliError::new(DATA_INVALID, "loopback verification failed"));
    }
    info!(elapsed_ms = report.elapsed_ms, "loopback passed");
    Ok(SUCCESS)
}

fn direction_report(
    sent: u32,
    tally: &Tally,
    sender: &AdapterStats,
    receiver: &AdapterStats,
) -> DirectionReport {
    DirectionReport {
        sent,
        verified: tally.verified.load(Ordering::Relaxed),
        corrupt: tally.corrupt.load(Ordering::Relaxed),
        frames_sent: sender.frames_sent,
        frames_received: receiver.frames_received,
    }
}
