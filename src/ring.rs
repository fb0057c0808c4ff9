// src/ring.rs

use std::ptr;

use crate::error::ShmError;
use crate::layout::{MIN_CAPACITY, RingHeader, round_down_pow2};
use crate::region::Region;
use crate::sync::{Ordering, fence};

/// SPSC byte ring over a shared region.
///
/// Interprets the first 16 bytes of the region as a [`RingHeader`] and the
/// rest as a circular data area. Messages are length-prefixed frames:
/// `[4-byte length LE][payload]`, wrapped physically at the end of the
/// data area. The view holds no state of its own beyond cached capacity;
/// all coordination goes through the header cursors.
///
/// The peer on the other end of the region does not have to be this crate,
/// or Rust: anything that honours the byte layout and performs aligned
/// 32-bit accesses with acquire/release ordering interoperates.
///
/// SPSC discipline is a contract, not a checked property: at most one
/// thread (or process) may call the producer entry points ([`write`]) and
/// at most one the consumer entry points ([`read`]). Two writers are
/// undefined behaviour.
///
/// [`write`]: ByteRing::write
/// [`read`]: ByteRing::read
pub struct ByteRing {
    header: *mut RingHeader,
    data: *mut u8,
    capacity: u32,
    mask: u32,
}

// Safety: the header cursors are the only shared mutable state and all
// cross-endpoint accesses to them are atomic with acquire/release edges.
unsafe impl Send for ByteRing {}
unsafe impl Sync for ByteRing {}

impl ByteRing {
    /// Bind to `region` as the producer, initializing the header.
    ///
    /// The capacity becomes the largest power of two that fits in
    /// `region.len() - 16`. Fails if that leaves less than the 4-byte
    /// minimum.
    pub fn init(region: Region) -> Result<Self, ShmError> {
        if region.data_len() < MIN_CAPACITY as usize {
            return Err(ShmError::InvalidHeader);
        }

        let capacity = round_down_pow2(region.data_len().min(u32::MAX as usize) as u32);

        let header = region.header_ptr();
        // Safety: we are the only endpoint touching the region until the
        // release fence below.
        unsafe { (*header).init(capacity) };
        // Publish the header before the region name is handed to a consumer.
        fence(Ordering::Release);

        Ok(Self {
            header,
            data: region.data_ptr(),
            capacity,
            mask: capacity - 1,
        })
    }

    /// Bind to `region` as the consumer, reading the header the producer
    /// wrote.
    ///
    /// The header is sanity-checked: a capacity that is not a power of two
    /// in `4..=2^31`, or that does not fit the region, means the producer
    /// never initialized it (or something scribbled over it) and the view
    /// refuses to bind.
    pub fn attach(region: Region) -> Result<Self, ShmError> {
        if region.data_len() < MIN_CAPACITY as usize {
            return Err(ShmError::InvalidHeader);
        }

        // Pair with the producer's release fence after init.
        fence(Ordering::Acquire);

        let header = region.header_ptr();
        // Safety: header_ptr checked the region holds a header.
        let capacity = unsafe {
            if !(*header).validate() {
                return Err(ShmError::InvalidHeader);
            }
            (*header).capacity
        };
        if capacity as usize > region.data_len() {
            return Err(ShmError::InvalidHeader);
        }

        Ok(Self {
            header,
            data: region.data_ptr(),
            capacity,
            mask: capacity - 1,
        })
    }

    #[inline]
    fn header(&self) -> &RingHeader {
        // Safety: validated at construction; the mapping outlives the view
        // (callers must keep the owning SharedMemory/HeapRegion alive).
        unsafe { &*self.header }
    }

    /// Data area size in bytes.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Bytes currently occupied by frames (consumer viewpoint).
    #[inline]
    pub fn readable_bytes(&self) -> u32 {
        let header = self.header();
        let tail = header.tail.load(Ordering::Relaxed);
        let head = header.head.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    /// Bytes currently free for new frames (producer viewpoint).
    #[inline]
    pub fn writeable_bytes(&self) -> u32 {
        let header = self.header();
        let head = header.head.load(Ordering::Relaxed);
        let tail = header.tail.load(Ordering::Acquire);
        self.capacity - head.wrapping_sub(tail)
    }

    /// True if at least one length prefix is in flight.
    #[inline]
    pub fn has_data(&self) -> bool {
        self.readable_bytes() >= 4
    }

    /// Write one length-prefixed message. Producer side only.
    ///
    /// Returns false without touching the ring if the payload is empty
    /// (a zero length prefix is reserved for "no frame"), can never fit
    /// (`len + 4 > capacity`), or does not fit right now.
    pub fn write(&self, payload: &[u8]) -> bool {
        if payload.is_empty() || payload.len() > (self.capacity - 4) as usize {
            return false;
        }
        let len = payload.len() as u32;

        let header = self.header();
        let head = header.head.load(Ordering::Relaxed);
        let tail = header.tail.load(Ordering::Acquire);

        let free = self.capacity - head.wrapping_sub(tail);
        if free < len + 4 {
            return false;
        }

        self.copy_in(head, &len.to_le_bytes());
        self.copy_in(head.wrapping_add(4), payload);

        // Release: the frame bytes above become visible before the new head.
        header
            .head
            .store(head.wrapping_add(len + 4), Ordering::Release);
        true
    }

    /// Read one length-prefixed message into `out`. Consumer side only.
    ///
    /// Returns the payload length, or 0 when there is no complete frame.
    /// A frame larger than `out` is skipped (tail advances past it) and 0
    /// is returned; callers that must not lose frames size `out` for the
    /// producer's largest message.
    pub fn read(&self, out: &mut [u8]) -> usize {
        let header = self.header();
        let tail = header.tail.load(Ordering::Relaxed);
        let head = header.head.load(Ordering::Acquire);

        let avail = head.wrapping_sub(tail);
        if avail < 4 {
            return 0;
        }

        let mut len_bytes = [0u8; 4];
        self.copy_out(tail, &mut len_bytes);
        let len = u32::from_le_bytes(len_bytes);

        // Incomplete frame: the producer has published the prefix but not
        // the payload yet (or the prefix itself is still zero).
        if len == 0 || (avail as u64) < len as u64 + 4 {
            return 0;
        }

        if len as usize > out.len() {
            // Skip: drop the frame rather than wedging the queue on an
            // undersized reader buffer.
            header
                .tail
                .store(tail.wrapping_add(len + 4), Ordering::Release);
            return 0;
        }

        self.copy_out(tail.wrapping_add(4), &mut out[..len as usize]);

        // Release: finish reading the frame bytes before freeing them.
        header
            .tail
            .store(tail.wrapping_add(len + 4), Ordering::Release);
        len as usize
    }

    /// Copy `src` into the data area at logical position `pos`, splitting
    /// at the physical end of the area when the frame wraps.
    fn copy_in(&self, pos: u32, src: &[u8]) {
        let off = (pos & self.mask) as usize;
        let first = self.capacity as usize - off;
        // Safety: off < capacity and the two segments together stay within
        // the data area; the caller checked the ring has room, so the
        // target bytes are not under the consumer.
        unsafe {
            if first >= src.len() {
                ptr::copy_nonoverlapping(src.as_ptr(), self.data.add(off), src.len());
            } else {
                ptr::copy_nonoverlapping(src.as_ptr(), self.data.add(off), first);
                ptr::copy_nonoverlapping(src.as_ptr().add(first), self.data, src.len() - first);
            }
        }
    }

    /// Copy from the data area at logical position `pos` into `dst`,
    /// wrap-aware like `copy_in`.
    fn copy_out(&self, pos: u32, dst: &mut [u8]) {
        let off = (pos & self.mask) as usize;
        let first = self.capacity as usize - off;
        // Safety: mirror of copy_in; the caller checked the bytes are
        // published, so the source range is not under the producer.
        unsafe {
            if first >= dst.len() {
                ptr::copy_nonoverlapping(self.data.add(off), dst.as_mut_ptr(), dst.len());
            } else {
                ptr::copy_nonoverlapping(self.data.add(off), dst.as_mut_ptr(), first);
                ptr::copy_nonoverlapping(self.data, dst.as_mut_ptr().add(first), dst.len() - first);
            }
        }
    }
}
