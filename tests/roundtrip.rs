//! Integration tests for the shared-memory channel: two views over one
//! buffer, and the producer/consumer facades over a real named region.

use bytering::{ByteRing, HeapRegion, ShmConsumer, ShmProducer, remove_shared_memory};

fn unique_name(tag: &str) -> String {
    format!("bytering-it-{}-{tag}", std::process::id())
}

struct Unlink(String);
impl Drop for Unlink {
    fn drop(&mut self) {
        remove_shared_memory(&self.0);
    }
}

#[test]
fn two_views_one_buffer() {
    let heap = HeapRegion::with_capacity(256);
    let producer = ByteRing::init(heap.region()).unwrap();
    let consumer = ByteRing::attach(heap.region()).unwrap();

    assert!(producer.write(b"cross-lang"));
    assert!(consumer.has_data());

    let mut out = [0u8; 64];
    let n = consumer.read(&mut out);
    assert_eq!(n, 10);
    assert_eq!(&out[..10], b"cross-lang");
}

#[test]
fn facade_roundtrip_identity() {
    let name = unique_name("identity");
    let _cleanup = Unlink(name.clone());

    let mut producer = ShmProducer::create(&name, 4096).unwrap();
    let mut consumer = ShmConsumer::open(&name).unwrap();

    // A mix of lengths, including ones that force the prefix and the
    // payload to wrap during later rounds.
    let messages: Vec<Vec<u8>> = (1..=50)
        .map(|i| (0..i * 7 % 200 + 1).map(|b| (b * 31 + i) as u8).collect())
        .collect();

    let mut out = vec![0u8; 4096];
    for msg in &messages {
        assert!(producer.write(msg));
        let n = consumer.read(&mut out);
        assert_eq!(&out[..n], &msg[..], "message of len {}", msg.len());
    }
    assert_eq!(consumer.read(&mut out), 0);
    assert!(!consumer.has_data());
}

#[test]
fn facade_backpressure_and_drain() {
    let name = unique_name("backpressure");
    let _cleanup = Unlink(name.clone());

    let mut producer = ShmProducer::create(&name, 64).unwrap();
    let mut consumer = ShmConsumer::open(&name).unwrap();

    // Fill until the ring rejects a frame.
    let payload = [0x5Au8; 12];
    let mut accepted = 0;
    while producer.write(&payload) {
        accepted += 1;
    }
    assert_eq!(accepted, 4); // 4 * (4 + 12) == 64
    assert_eq!(producer.writeable_bytes(), 0);

    // Drain restores the full capacity.
    let mut out = [0u8; 64];
    for _ in 0..accepted {
        assert_eq!(consumer.read(&mut out), 12);
    }
    assert_eq!(consumer.read(&mut out), 0);
    assert_eq!(producer.writeable_bytes(), producer.capacity());

    // And the freed space accepts frames again, now wrapping.
    assert!(producer.write(&payload));
    assert_eq!(consumer.read(&mut out), 12);
    assert_eq!(&out[..12], &payload);
}

#[test]
fn oversized_frame_dropped_at_facade() {
    let name = unique_name("oversized");
    let _cleanup = Unlink(name.clone());

    let mut producer = ShmProducer::create(&name, 64).unwrap();
    let mut consumer = ShmConsumer::open(&name).unwrap();

    assert!(producer.write(b"hello world!"));

    let mut small = [0u8; 4];
    assert_eq!(consumer.read(&mut small), 0);
    assert!(!consumer.has_data());
}

#[test]
fn capacity_agreement_across_processes() {
    // The consumer never guesses: whatever the producer rounded to is
    // what the header says.
    for (requested, expected) in [(100u32, 64u32), (128, 128), (33, 32)] {
        let name = unique_name(&format!("cap{requested}"));
        let _cleanup = Unlink(name.clone());

        let producer = ShmProducer::create(&name, requested).unwrap();
        assert_eq!(producer.capacity(), expected);

        let consumer = ShmConsumer::open(&name).unwrap();
        assert_eq!(consumer.capacity(), expected);
    }
}

#[test]
fn late_consumer_drains_after_producer_drop() {
    let name = unique_name("late");
    let _cleanup = Unlink(name.clone());

    {
        let mut producer = ShmProducer::create(&name, 256).unwrap();
        assert!(producer.write(b"left behind"));
        // Producer drops without destroy: the region persists.
    }

    let mut consumer = ShmConsumer::open(&name).unwrap();
    let mut out = [0u8; 64];
    let n = consumer.read(&mut out);
    assert_eq!(&out[..n], b"left behind");
}
