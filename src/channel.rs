// src/channel.rs

use crate::SharedMemory;
use crate::error::ShmError;
use crate::layout::HEADER_SIZE;
use crate::ring::ByteRing;

/// Producer end of a named shared-memory channel.
///
/// Creates the region and initializes the ring header. Exactly one
/// producer may exist per channel name; the matching [`ShmConsumer`]
/// opens the same name from the other process.
///
/// Construction is the only I/O; every later call is a handful of loads,
/// stores and memcpys on the mapping.
pub struct ShmProducer {
    shm: SharedMemory,
    ring: ByteRing,
}

impl ShmProducer {
    /// Create a channel named `name` with a data area of roughly
    /// `capacity` bytes (rounded down to a power of two).
    ///
    /// The region persists after drop so a late-starting consumer can
    /// still drain it; call [`destroy`](Self::destroy) to unlink the name
    /// explicitly.
    pub fn create(name: &str, capacity: u32) -> Result<Self, ShmError> {
        let size = capacity as usize + HEADER_SIZE;
        let shm = SharedMemory::create(name, size, true)?;
        let ring = ByteRing::init(shm.region())?;
        tracing::debug!(name, capacity = ring.capacity(), "producer channel ready");
        Ok(Self { shm, ring })
    }

    /// Write one message. Returns false if the ring has no room (or the
    /// payload is empty or can never fit); nothing is partially written.
    pub fn write(&mut self, payload: &[u8]) -> bool {
        self.ring.write(payload)
    }

    /// Bytes currently free for new frames.
    pub fn writeable_bytes(&self) -> u32 {
        self.ring.writeable_bytes()
    }

    /// Actual data-area capacity after power-of-two rounding.
    pub fn capacity(&self) -> u32 {
        self.ring.capacity()
    }

    /// The normalized region name.
    pub fn name(&self) -> &str {
        self.shm.name()
    }

    /// Unlink the region name so future opens fail. The live channel
    /// keeps working for both ends that already hold mappings.
    pub fn destroy(&self) {
        self.shm.destroy();
    }
}

/// Consumer end of a named shared-memory channel.
///
/// Opens a region some producer created and reads messages in order.
pub struct ShmConsumer {
    shm: SharedMemory,
    ring: ByteRing,
}

impl ShmConsumer {
    /// Open the channel named `name`, auto-detecting the region size.
    ///
    /// On Win32 the view size cannot be detected before mapping; prefer
    /// [`open_with_size`](Self::open_with_size) there when the producer's
    /// capacity is known.
    pub fn open(name: &str) -> Result<Self, ShmError> {
        Self::open_with_size(name, 0)
    }

    /// Open the channel named `name` with an explicit total region size
    /// (header + capacity). Pass 0 to auto-detect.
    pub fn open_with_size(name: &str, total_size: usize) -> Result<Self, ShmError> {
        let shm = SharedMemory::open(name, total_size)?;
        let ring = ByteRing::attach(shm.region())?;
        tracing::debug!(name, capacity = ring.capacity(), "consumer channel ready");
        Ok(Self { shm, ring })
    }

    /// Read one message into `out`. Returns the payload length, or 0 when
    /// no complete frame is available. A frame larger than `out` is
    /// dropped and 0 returned; size `out` for the producer's largest
    /// message if that matters.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        self.ring.read(out)
    }

    /// Bytes currently occupied by frames.
    pub fn readable_bytes(&self) -> u32 {
        self.ring.readable_bytes()
    }

    /// True if at least one length prefix is in flight.
    pub fn has_data(&self) -> bool {
        self.ring.has_data()
    }

    /// Data-area capacity as the producer configured it.
    pub fn capacity(&self) -> u32 {
        self.ring.capacity()
    }

    /// The normalized region name.
    pub fn name(&self) -> &str {
        self.shm.name()
    }
}

/// Best-effort removal of a leftover channel region by name.
///
/// Useful before creating a producer when a previous run may have died
/// without cleaning up, or from teardown scripts.
pub fn remove_shared_memory(name: &str) {
    SharedMemory::remove(name);
}
