// src/region.rs

use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::mem::size_of;
use std::ptr::NonNull;

use crate::layout::RingHeader;

/// A byte range holding one channel: the ring header at the start, the
/// circular data area right after it.
///
/// Non-owning and `Copy` — the producer and the consumer each hold their
/// own `Region` over the same mapping, and the owner of that mapping
/// (a `SharedMemory` or a [`HeapRegion`]) must outlive every copy. The
/// split between header and data lives here so the ring layer never does
/// its own offset arithmetic.
#[derive(Clone, Copy)]
pub struct Region {
    base: NonNull<u8>,
    len: usize,
}

impl Region {
    /// Wrap a raw byte range as a channel region.
    ///
    /// # Safety
    ///
    /// - `base` must be valid for reads and writes of `len` bytes
    /// - the memory must remain valid for the lifetime of this Region
    ///   and every copy of it
    pub unsafe fn from_raw(base: *mut u8, len: usize) -> Self {
        let base = NonNull::new(base).expect("channel region must be non-null");
        Self { base, len }
    }

    /// Base pointer of the whole range (header included).
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Total size of the range in bytes, header included.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the range has zero length.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The ring header at the start of the range.
    ///
    /// Panics if the range is too short to hold one; whether the header
    /// *contents* make sense is the ring layer's problem.
    #[inline]
    pub fn header_ptr(&self) -> *mut RingHeader {
        assert!(
            self.len >= size_of::<RingHeader>(),
            "{} bytes cannot hold a ring header",
            self.len
        );
        self.base.as_ptr() as *mut RingHeader
    }

    /// First byte of the circular data area, just past the header.
    #[inline]
    pub fn data_ptr(&self) -> *mut u8 {
        assert!(
            self.len >= size_of::<RingHeader>(),
            "{} bytes cannot hold a ring header",
            self.len
        );
        unsafe { self.base.as_ptr().add(size_of::<RingHeader>()) }
    }

    /// Bytes left over for the data area once the header is paid for.
    /// This is the upper bound the ring's capacity is rounded down from.
    #[inline]
    pub fn data_len(&self) -> usize {
        self.len.saturating_sub(size_of::<RingHeader>())
    }
}

unsafe impl Send for Region {}
unsafe impl Sync for Region {}

/// Heap-backed channel storage for tests and same-process pairs.
///
/// A producer view and a consumer view over `heap.region()` behave
/// exactly like two processes sharing an OS mapping, minus the OS.
pub struct HeapRegion {
    base: NonNull<u8>,
    len: usize,
    layout: Layout,
}

impl HeapRegion {
    /// Allocate zeroed storage for a channel whose data area is
    /// `data_size` bytes (the header comes on top).
    pub fn with_capacity(data_size: usize) -> Self {
        Self::new_zeroed(size_of::<RingHeader>() + data_size)
    }

    /// Allocate a zeroed range of exactly `size` bytes.
    ///
    /// 64-byte alignment puts the header on its own cache line, matching
    /// what a page-aligned OS mapping gives the other backends.
    pub fn new_zeroed(size: usize) -> Self {
        let layout = Layout::from_size_align(size.max(1), 64).expect("bad channel buffer size");
        let base = NonNull::new(unsafe { alloc_zeroed(layout) })
            .expect("channel buffer allocation failed");
        Self {
            base,
            len: size,
            layout,
        }
    }

    /// A channel region over this allocation.
    #[inline]
    pub fn region(&self) -> Region {
        // Safety: the allocation lives until drop and is len bytes long.
        unsafe { Region::from_raw(self.base.as_ptr(), self.len) }
    }

    /// Allocation size in bytes, header included.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the allocation is zero-length.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for HeapRegion {
    fn drop(&mut self) {
        unsafe { dealloc(self.base.as_ptr(), self.layout) };
    }
}

unsafe impl Send for HeapRegion {}
unsafe impl Sync for HeapRegion {}
