// src/sync.rs

#[cfg(not(loom))]
pub use std::sync::atomic::{AtomicU32, Ordering, fence};

#[cfg(loom)]
pub use loom::sync::atomic::{AtomicU32, Ordering, fence};

#[cfg(loom)]
pub use loom::thread;
