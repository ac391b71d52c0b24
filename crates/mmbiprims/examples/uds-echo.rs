//! Management controller side over a Unix datagram device: echoes every
//! message back to its sender.
//!
//! Run with:
//!   cargo run --example uds-echo
//!
//! In another terminal:
//!   cargo run --features cli --bin mmbi -- send /tmp/mmbi-echo/host.sock \
//!     /tmp/mmbi-echo/bmc.sock --dest 9 --data hello --wait

#[cfg(unix)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::sync::mpsc;
    use std::time::Duration;

    use mmbiprims::binding::{
        AdapterConfig, PollStatus, RetryPolicy, TransportConfig, TransportContext,
    };
    use mmbiprims::channel::UnixDatagramOpener;

    let dir = std::env::temp_dir().join("mmbi-echo");
    std::fs::create_dir_all(&dir)?;
    let opener = UnixDatagramOpener::new(dir.join("bmc.sock"), dir.join("host.sock"));

    // Wait up to a minute for the host side to show up.
    let adapter =
        AdapterConfig::default().with_open_retry(RetryPolicy::new(600, Duration::from_millis(100)));
    eprintln!("waiting for host at {}", dir.join("host.sock").display());
    let bmc = TransportContext::init(&opener, TransportConfig::new(9).with_adapter(adapter))?;

    let (tx, rx) = mpsc::channel();
    bmc.set_receive_callback(move |src, payload| {
        let _ = tx.send((src, payload.to_vec()));
    });

    loop {
        if bmc.poll()? == PollStatus::NoData {
            std::thread::sleep(Duration::from_millis(5));
        }
        while let Ok((src, payload)) = rx.try_recv() {
            eprintln!("echoing {} bytes to endpoint {src}", payload.len());
            bmc.send(src, &payload)?;
        }
    }
}

#[cfg(not(unix))]
fn main() {
    eprintln!("uds-echo requires a Unix platform");
}
