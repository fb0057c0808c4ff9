//! Ring header layout.
//!
//! The first 16 bytes of the shared region form the header; the data area
//! follows immediately. Both sides of the channel, in whatever language,
//! agree on this exact byte layout:
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬──────────┬──────────────────────────┐
//! │ head u32 │ tail u32 │ cap  u32 │ rsvd u32 │ data area (cap bytes)    │
//! └──────────┴──────────┴──────────┴──────────┴──────────────────────────┘
//!   0          4          8          12         16
//! ```
//!
//! All fields are little-endian. `head` and `tail` are monotonically
//! increasing 32-bit indices; the physical offset of a byte is
//! `index & (capacity - 1)`.

use std::mem::size_of;

use crate::sync::AtomicU32;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 16;

/// Smallest admissible data-area capacity.
pub const MIN_CAPACITY: u32 = 4;

/// Largest admissible data-area capacity. Unsigned modular `head - tail`
/// stays sign-safe only while capacity does not exceed 2^31.
pub const MAX_CAPACITY: u32 = 1 << 31;

/// Shared ring header at the start of the region.
///
/// `head` is written only by the producer, `tail` only by the consumer.
/// `capacity` is written once by the producer during init and read-only
/// afterwards.
#[repr(C)]
pub struct RingHeader {
    /// Producer write cursor (monotonically increasing).
    pub head: AtomicU32,
    /// Consumer read cursor (monotonically increasing).
    pub tail: AtomicU32,
    /// Data area size in bytes (power of two).
    pub capacity: u32,
    /// Zero on init.
    pub reserved: u32,
}

#[cfg(not(loom))]
const _: () = assert!(size_of::<RingHeader>() == HEADER_SIZE);

impl RingHeader {
    /// Initialize the header for a data area of `capacity` bytes.
    ///
    /// Field order matters for a consumer that attaches mid-init: the
    /// cursors land last, and the caller must issue a release fence after
    /// this returns before the region name is shared.
    pub fn init(&mut self, capacity: u32) {
        debug_assert!(capacity.is_power_of_two(), "capacity must be power of 2");
        self.reserved = 0;
        self.capacity = capacity;
        self.tail = AtomicU32::new(0);
        self.head = AtomicU32::new(0);
    }

    /// Check that `capacity` looks like something a producer wrote.
    pub fn validate(&self) -> bool {
        let cap = self.capacity;
        cap.is_power_of_two() && (MIN_CAPACITY..=MAX_CAPACITY).contains(&cap)
    }
}

/// Round `v` down to the nearest power of two. Returns 0 for 0.
pub fn round_down_pow2(v: u32) -> u32 {
    if v == 0 {
        return 0;
    }
    1 << (31 - v.leading_zeros())
}
