use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mmbi_binding::{
    AdapterConfig, BindingError, LinkStatus, PollStatus, RetryPolicy, TagPolicy, TransportConfig,
    TransportContext,
};
use mmbi_channel::{DuplexChannel, Side, DEFAULT_RING_CAPACITY};
use mmbi_frame::MIN_FRAME;
use parking_lot::Mutex;

const HOST_EID: u8 = 8;
const BMC_EID: u8 = 9;

fn config(local_id: u8) -> TransportConfig {
    TransportConfig::new(local_id).with_adapter(
        AdapterConfig::default()
            .with_open_retry(RetryPolicy::immediate(5))
            .with_tx_retry(RetryPolicy::new(10_000, Duration::from_micros(100))),
    )
}

fn pair(
    duplex: &DuplexChannel,
    host: TransportConfig,
    bmc: TransportConfig,
) -> (TransportContext, TransportContext) {
    let host = TransportContext::init(&duplex.opener(Side::A), host).unwrap();
    let bmc = TransportContext::init(&duplex.opener(Side::B), bmc).unwrap();
    (host, bmc)
}

fn collect(ctx: &TransportContext) -> Arc<Mutex<Vec<(u8, Vec<u8>)>>> {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    ctx.set_receive_callback(move |src, payload| sink.lock().push((src, payload.to_vec())));
    received
}

fn patterned(len: usize) -> Vec<u8> {
    let mut data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    data[0] = 0xAA;
    data[len - 1] = 0xBB;
    data
}

fn drain(ctx: &TransportContext) -> usize {
    let mut frames = 0;
    while let PollStatus::Delivered(_) = ctx.poll().unwrap() {
        frames += 1;
    }
    frames
}

#[test]
fn message_crosses_in_both_directions() {
    let duplex = DuplexChannel::new(DEFAULT_RING_CAPACITY).unwrap();
    let (host, bmc) = pair(&duplex, config(HOST_EID), config(BMC_EID));
    let at_host = collect(&host);
    let at_bmc = collect(&bmc);

    host.send(BMC_EID, b"get-version").unwrap();
    bmc.send(HOST_EID, b"version=1.0").unwrap();

    assert_eq!(drain(&bmc), 1);
    assert_eq!(drain(&host), 1);
    assert_eq!(*at_bmc.lock(), vec![(HOST_EID, b"get-version".to_vec())]);
    assert_eq!(*at_host.lock(), vec![(BMC_EID, b"version=1.0".to_vec())]);
}

#[test]
fn large_message_is_fragmented_and_reassembled() {
    let duplex = DuplexChannel::new(DEFAULT_RING_CAPACITY).unwrap();
    let small_frames = |id| {
        let mut cfg = config(id);
        cfg.adapter.max_frame_size = MIN_FRAME;
        cfg
    };
    let (host, bmc) = pair(&duplex, small_frames(HOST_EID), small_frames(BMC_EID));
    let at_bmc = collect(&bmc);

    let message = patterned(4000);
    host.send(BMC_EID, &message).unwrap();

    // 4000 bytes in 64-byte packets.
    assert_eq!(drain(&bmc), 63);
    let received = at_bmc.lock();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].1, message);
    assert_eq!(host.stats().frames_sent, 63);
}

#[test]
fn messages_arrive_in_send_order() {
    let duplex = DuplexChannel::new(DEFAULT_RING_CAPACITY).unwrap();
    let (host, bmc) = pair(&duplex, config(HOST_EID), config(BMC_EID));
    let at_bmc = collect(&bmc);

    for i in 0..50u8 {
        host.send(BMC_EID, &[i; 32]).unwrap();
    }
    drain(&bmc);

    let received = at_bmc.lock();
    assert_eq!(received.len(), 50);
    for (i, (_, payload)) in received.iter().enumerate() {
        assert_eq!(payload, &vec![i as u8; 32]);
    }
}

#[test]
fn concurrent_send_and_poll() {
    let duplex = DuplexChannel::new(16 * 1024).unwrap();
    let (host, bmc) = pair(&duplex, config(HOST_EID), config(BMC_EID));
    let host = Arc::new(host);
    let bmc = Arc::new(bmc);

    let count = Arc::new(AtomicUsize::new(0));
    let bytes = Arc::new(AtomicUsize::new(0));
    {
        let count = Arc::clone(&count);
        let bytes = Arc::clone(&bytes);
        bmc.set_receive_callback(move |src, payload| {
            assert_eq!(src, HOST_EID);
            assert_eq!(payload[0], 0xAA);
            assert_eq!(payload[payload.len() - 1], 0xBB);
            count.fetch_add(1, Ordering::SeqCst);
            bytes.fetch_add(payload.len(), Ordering::SeqCst);
        });
    }

    const MESSAGES: usize = 200;
    let sender = {
        let host = Arc::clone(&host);
        thread::spawn(move || {
            let message = patterned(1024);
            for _ in 0..MESSAGES {
                host.send(BMC_EID, &message).unwrap();
            }
        })
    };

    let seen = Arc::clone(&count);
    bmc.poll_until(Duration::from_secs(10), Duration::from_micros(100), || {
        seen.load(Ordering::SeqCst) == MESSAGES
    })
    .unwrap();
    sender.join().unwrap();

    assert_eq!(bytes.load(Ordering::SeqCst), MESSAGES * 1024);
}

#[test]
fn concurrent_multi_packet_senders_keep_messages_intact() {
    const SENDERS: usize = 4;
    const PER_SENDER: usize = 250;
    const LEN: usize = 3000;

    let duplex = DuplexChannel::new(64 * 1024).unwrap();
    let small_frames = |id| {
        let mut cfg = config(id);
        cfg.adapter.max_frame_size = MIN_FRAME;
        cfg
    };
    let (host, bmc) = pair(&duplex, small_frames(HOST_EID), small_frames(BMC_EID));
    let host = Arc::new(host);

    // Byte 1 carries the sender index so each message can be checked in full.
    let message_for = |sender: usize| {
        let mut data = patterned(LEN);
        data[1] = sender as u8;
        data
    };

    let intact = Arc::new(Mutex::new([0usize; SENDERS]));
    let corrupt = Arc::new(AtomicUsize::new(0));
    {
        let intact = Arc::clone(&intact);
        let corrupt = Arc::clone(&corrupt);
        bmc.set_receive_callback(move |src, payload| {
            let sender = payload.get(1).copied().unwrap_or(u8::MAX) as usize;
            if src == HOST_EID && sender < SENDERS && payload == message_for(sender).as_slice() {
                intact.lock()[sender] += 1;
            } else {
                corrupt.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    let senders: Vec<_> = (0..SENDERS)
        .map(|sender| {
            let host = Arc::clone(&host);
            thread::spawn(move || {
                let message = message_for(sender);
                for _ in 0..PER_SENDER {
                    host.send(BMC_EID, &message).unwrap();
                }
            })
        })
        .collect();

    let seen = Arc::clone(&intact);
    let bad = Arc::clone(&corrupt);
    let result = bmc.poll_until(Duration::from_secs(30), Duration::from_micros(50), || {
        seen.lock().iter().sum::<usize>() + bad.load(Ordering::SeqCst) == SENDERS * PER_SENDER
            || (senders.iter().all(|s| s.is_finished()) && duplex.ring(Side::A).is_empty())
    });
    for sender in senders {
        sender.join().unwrap();
    }
    result.unwrap();
    drain(&bmc);

    assert_eq!(corrupt.load(Ordering::SeqCst), 0);
    assert_eq!(*intact.lock(), [PER_SENDER; SENDERS]);
    assert_eq!(bmc.stack().pending_messages(), 0);
}

#[test]
fn oversize_inbound_frame_is_dropped_and_polling_continues() {
    let duplex = DuplexChannel::new(DEFAULT_RING_CAPACITY).unwrap();
    let mut narrow = config(BMC_EID);
    narrow.adapter.max_frame_size = MIN_FRAME;
    let (host, bmc) = pair(&duplex, config(HOST_EID), narrow);
    let at_bmc = collect(&bmc);

    host.send(BMC_EID, &[0x11; 200]).unwrap();
    host.send(BMC_EID, b"fits").unwrap();

    assert_eq!(bmc.poll().unwrap(), PollStatus::NoData);
    assert_eq!(bmc.stats().rx_oversize, 1);
    assert_eq!(drain(&bmc), 1);
    assert_eq!(*at_bmc.lock(), vec![(HOST_EID, b"fits".to_vec())]);
    assert_eq!(bmc.status(), LinkStatus::Open);
}

#[test]
fn repeated_empty_polls_change_nothing() {
    let duplex = DuplexChannel::new(4096).unwrap();
    let (host, bmc) = pair(&duplex, config(HOST_EID), config(BMC_EID));
    let at_bmc = collect(&bmc);

    for _ in 0..100 {
        assert_eq!(bmc.poll().unwrap(), PollStatus::NoData);
    }
    assert!(at_bmc.lock().is_empty());
    assert_eq!(bmc.status(), LinkStatus::Open);
    assert_eq!(bmc.stats().frames_received, 0);
    assert!(duplex.ring(Side::A).is_empty());

    host.send(BMC_EID, b"after").unwrap();
    assert_eq!(drain(&bmc), 1);
}

#[test]
fn messages_for_other_endpoints_are_ignored() {
    let duplex = DuplexChannel::new(4096).unwrap();
    let (host, bmc) = pair(&duplex, config(HOST_EID), config(BMC_EID));
    let at_bmc = collect(&bmc);

    host.send(0x42, b"elsewhere").unwrap();
    host.send(mmbi_frame::EID_BROADCAST, b"everyone").unwrap();

    assert_eq!(drain(&bmc), 2);
    assert_eq!(*at_bmc.lock(), vec![(HOST_EID, b"everyone".to_vec())]);
}

#[test]
fn tag_policy_is_applied() {
    let duplex = DuplexChannel::new(4096).unwrap();
    let responder = config(BMC_EID).with_tag_policy(TagPolicy {
        tag_owner: false,
        tag: 5,
    });
    let (host, bmc) = pair(&duplex, config(HOST_EID), responder);
    assert_eq!(host.tag_policy(), TagPolicy::default());

    bmc.send(HOST_EID, b"resp").unwrap();

    let mut frame = Vec::new();
    host.adapter()
        .poll(|bytes| frame.extend_from_slice(bytes))
        .unwrap();
    assert_eq!(frame[3] & 0x08, 0, "tag owner bit clear");
    assert_eq!(frame[3] & 0x07, 5);
}

#[test]
fn peer_teardown_surfaces_as_closed() {
    let duplex = DuplexChannel::new(4096).unwrap();
    let (host, bmc) = pair(&duplex, config(HOST_EID), config(BMC_EID));
    bmc.destroy();

    assert!(matches!(host.poll(), Err(BindingError::ChannelClosed)));
    assert!(matches!(host.send(BMC_EID, b"x"), Err(BindingError::ChannelClosed)));
}

#[test]
fn full_ring_without_reader_fails_send() {
    let duplex = DuplexChannel::new(256).unwrap();
    let quick = |id| {
        config(id).with_adapter(
            AdapterConfig::default()
                .with_open_retry(RetryPolicy::immediate(5))
                .with_tx_retry(RetryPolicy::immediate(3)),
        )
    };
    let (host, _bmc) = pair(&duplex, quick(HOST_EID), quick(BMC_EID));

    host.send(BMC_EID, &[0u8; 200]).unwrap();
    let err = host.send(BMC_EID, &[0u8; 200]).unwrap_err();
    assert!(matches!(err, BindingError::IoFailure { attempts: 3, .. }));
}
