use std::sync::Arc;
use std::thread;

use mmbi_channel::{Channel, DuplexChannel, RingChannel, Side};

#[test]
fn two_producers_lose_and_duplicate_nothing() {
    let ring = Arc::new(RingChannel::new(2048).unwrap());

    let producers: Vec<_> = [0u8, 1u8]
        .into_iter()
        .map(|id| {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                for _ in 0..1000 {
                    while ring.write(&[id]) == 0 {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }

    assert_eq!(ring.len(), 2000);
    let mut out = vec![0u8; 2048];
    assert_eq!(ring.read(&mut out), 2000);

    let zeros = out[..2000].iter().filter(|&&b| b == 0).count();
    let ones = out[..2000].iter().filter(|&&b| b == 1).count();
    assert_eq!(zeros, 1000);
    assert_eq!(ones, 1000);
    assert!(ring.is_empty());
}

#[test]
fn producer_and_consumer_keep_fifo_order() {
    let ring = Arc::new(RingChannel::new(64).unwrap());
    let total = 10_000usize;

    let writer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            let mut next = 0usize;
            while next < total {
                let byte = [(next % 251) as u8];
                if ring.write(&byte) == 1 {
                    next += 1;
                } else {
                    thread::yield_now();
                }
            }
        })
    };

    let mut received = 0usize;
    let mut buf = [0u8; 17];
    while received < total {
        let n = ring.read(&mut buf);
        for &byte in &buf[..n] {
            assert_eq!(byte, (received % 251) as u8);
            received += 1;
        }
        if n == 0 {
            thread::yield_now();
        }
    }

    writer.join().unwrap();
    assert!(ring.is_empty());
}

#[test]
fn duplex_endpoints_across_threads() {
    let duplex = DuplexChannel::new(256).unwrap();
    let host = duplex.endpoint(Side::A).unwrap();
    let bmc = duplex.endpoint(Side::B).unwrap();

    let sender = thread::spawn(move || {
        for i in 0..200u8 {
            let frame = [i; 9];
            while host.write(&frame).unwrap() == 0 {
                thread::yield_now();
            }
        }
        host
    });

    let mut buf = [0u8; 32];
    let mut expected = 0u8;
    while expected < 200 {
        let n = bmc.read(&mut buf).unwrap();
        if n == 0 {
            thread::yield_now();
            continue;
        }
        assert_eq!(n, 9);
        assert!(buf[..n].iter().all(|&b| b == expected));
        expected += 1;
    }

    let _host = sender.join().unwrap();
}
