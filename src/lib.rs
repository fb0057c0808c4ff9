#![doc = include_str!("../README.md")]

pub mod channel;
pub mod error;
pub mod layout;
pub mod region;
pub mod ring;
pub mod sync;

pub use channel::{ShmConsumer, ShmProducer, remove_shared_memory};
pub use error::ShmError;
pub use layout::{HEADER_SIZE, MAX_CAPACITY, MIN_CAPACITY, RingHeader};
pub use region::{HeapRegion, Region};
pub use ring::ByteRing;

// OS-level shared memory backends
#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::SharedMemory;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::SharedMemory;
