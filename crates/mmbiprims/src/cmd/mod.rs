use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

use mmbi_binding::{TransportConfig, TransportContext};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod loopback;
pub mod send;
pub mod version;

/// Endpoint id used for the host side when none is given.
pub const HOST_EID: u8 = 8;
/// Endpoint id used for the management controller side when none is given.
pub const BMC_EID: u8 = 9;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a host/BMC pair over an in-process duplex device and verify delivery.
    Loopback(LoopbackArgs),
    /// Send one MCTP message over a Unix datagram device.
    Send(SendArgs),
    /// Receive and print MCTP messages from a Unix datagram device.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Process-wide settings derived from global flags.
#[derive(Clone, Copy, Debug)]
pub struct RunContext {
    pub format: OutputFormat,
    pub trace_messages: bool,
}

pub fn run(command: Command, ctx: RunContext) -> CliResult<i32> {
    match command {
        Command::Loopback(args) => loopback::run(args, ctx),
        Command::Send(args) => send::run(args, ctx),
        Command::Listen(args) => listen::run(args, ctx),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct LoopbackArgs {
    /// Message size in bytes.
    #[arg(long, default_value_t = 4096)]
    pub size: usize,
    /// Number of messages to send.
    #[arg(long, default_value_t = 1)]
    pub count: u32,
    /// Also send from the BMC side back to the host.
    #[arg(long)]
    pub duplex: bool,
    /// Ring capacity per direction in bytes.
    #[arg(long, default_value_t = mmbi_channel::DEFAULT_RING_CAPACITY)]
    pub capacity: usize,
    /// Maximum frame size for both adapters.
    #[arg(long, default_value_t = 1024)]
    pub mtu: usize,
    /// Maximum time to wait for all messages (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Local socket path to bind.
    pub local: PathBuf,
    /// Peer socket path.
    pub peer: PathBuf,
    /// Local endpoint id.
    #[arg(long, default_value_t = HOST_EID)]
    pub eid: u8,
    /// Destination endpoint id.
    #[arg(long, default_value_t = BMC_EID)]
    pub dest: u8,
    /// Message tag (0-7).
    #[arg(long, default_value_t = 0)]
    pub tag: u8,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Wait for one response message and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for a response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Local socket path to bind.
    pub local: PathBuf,
    /// Peer socket path.
    pub peer: PathBuf,
    /// Local endpoint id.
    #[arg(long, default_value_t = BMC_EID)]
    pub eid: u8,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Send every received message back to its source.
    #[arg(long)]
    pub echo: bool,
    /// How long to keep retrying while the peer socket does not exist yet.
    #[arg(long, default_value = "30s")]
    pub open_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Open a transport over a Unix datagram device bound at `local`.
#[cfg(unix)]
pub(crate) fn open_unix_transport(
    local: &Path,
    peer: &Path,
    config: TransportConfig,
) -> CliResult<TransportContext> {
    let opener = mmbi_channel::UnixDatagramOpener::new(local, peer);
    TransportContext::init(&opener, config)
        .map_err(|err| crate::exit::binding_error("transport init failed", err))
}

#[cfg(not(unix))]
pub(crate) fn open_unix_transport(
    _local: &Path,
    _peer: &Path,
    _config: TransportConfig,
) -> CliResult<TransportContext> {
    Err(CliError::new(
        USAGE,
        "unix datagram devices are not available on this platform",
    ))
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
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
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
