//! Host and BMC transports on one simulated MMBI device, exchanging a 4 KiB
//! message each way.
//!
//! Run with:
//!   cargo run --example loopback

use std::sync::mpsc;
use std::time::Duration;

use mmbiprims::binding::{AdapterConfig, TransportConfig, TransportContext};
use mmbiprims::channel::{DuplexChannel, Side};

const HOST_EID: u8 = 8;
const BMC_EID: u8 = 9;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let device = DuplexChannel::new(64 * 1024)?;
    let adapter = AdapterConfig::default().with_max_frame_size(1024);

    let host = TransportContext::init(
        &device.opener(Side::A),
        TransportConfig::new(HOST_EID).with_adapter(adapter.clone()),
    )?;
    let bmc = TransportContext::init(
        &device.opener(Side::B),
        TransportConfig::new(BMC_EID).with_adapter(adapter),
    )?;

    let (tx, rx) = mpsc::channel();
    let bmc_tx = tx.clone();
    host.set_receive_callback(move |src, payload| {
        let _ = tx.send(("host", src, payload.len()));
    });
    bmc.set_receive_callback(move |src, payload| {
        let _ = bmc_tx.send(("bmc", src, payload.len()));
    });

    let mut message = vec![0u8; 4096];
    message[0] = 0xAA;
    message[4095] = 0xBB;

    host.send(BMC_EID, &message)?;
    bmc.send(HOST_EID, &message)?;

    let mut seen = 0;
    bmc.poll_until(Duration::from_secs(1), Duration::from_millis(1), || {
        // Drain the host side in the same loop.
        let _ = host.poll();
        while let Ok((who, src, len)) = rx.try_recv() {
            eprintln!("{who} received {len} bytes from endpoint {src}");
            seen += 1;
        }
        seen == 2
    })?;

    let stats = host.stats();
    eprintln!(
        "host: {} frames sent, {} frames received",
        stats.frames_sent, stats.frames_received
    );

    bmc.destroy();
    host.destroy();
    Ok(())
}
