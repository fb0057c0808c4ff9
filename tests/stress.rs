//! Threaded SPSC stress: one producer thread, one consumer thread, far
//! more traffic than one lap of the ring. Catches ordering bugs that the
//! single-threaded tests cannot.

use std::thread;

use bytering::{ByteRing, HeapRegion, ShmConsumer, ShmProducer, remove_shared_memory};

const TOTAL_MESSAGES: u32 = 10_000;

/// Payload for message `seq`: the sequence number followed by a run of
/// bytes derived from it, so corruption and reordering both show up.
fn payload_for(seq: u32) -> Vec<u8> {
    let len = (seq % 48 + 5) as usize;
    let mut buf = Vec::with_capacity(4 + len);
    buf.extend_from_slice(&seq.to_le_bytes());
    buf.extend(std::iter::repeat_n((seq % 251) as u8, len));
    buf
}

fn check_payload(out: &[u8], expect_seq: u32) {
    let seq = u32::from_le_bytes(out[..4].try_into().unwrap());
    assert_eq!(seq, expect_seq, "messages arrived out of order");
    let expected = payload_for(expect_seq);
    assert_eq!(out, &expected[..], "payload corrupted at seq {seq}");
}

#[test]
fn spsc_over_heap_region() {
    let heap = HeapRegion::with_capacity(256);
    let producer = ByteRing::init(heap.region()).unwrap();
    let consumer = ByteRing::attach(heap.region()).unwrap();

    thread::scope(|s| {
        s.spawn(|| {
            for seq in 0..TOTAL_MESSAGES {
                let msg = payload_for(seq);
                while !producer.write(&msg) {
                    std::hint::spin_loop();
                }
            }
        });

        s.spawn(|| {
            let mut out = [0u8; 256];
            for seq in 0..TOTAL_MESSAGES {
                let n = loop {
                    let n = consumer.read(&mut out);
                    if n > 0 {
                        break n;
                    }
                    std::hint::spin_loop();
                };
                check_payload(&out[..n], seq);
            }
            // Drained: nothing left behind.
            assert_eq!(consumer.readable_bytes(), 0);
        });
    });
}

#[test]
fn spsc_over_named_region() {
    let name = format!("bytering-stress-{}", std::process::id());

    let mut producer = ShmProducer::create(&name, 512).unwrap();
    let mut consumer = ShmConsumer::open(&name).unwrap();

    thread::scope(|s| {
        s.spawn(move || {
            for seq in 0..TOTAL_MESSAGES {
                let msg = payload_for(seq);
                while !producer.write(&msg) {
                    thread::yield_now();
                }
            }
        });

        s.spawn(move || {
            let mut out = [0u8; 512];
            for seq in 0..TOTAL_MESSAGES {
                let n = loop {
                    let n = consumer.read(&mut out);
                    if n > 0 {
                        break n;
                    }
                    thread::yield_now();
                };
                check_payload(&out[..n], seq);
            }
        });
    });

    remove_shared_memory(&name);
}
