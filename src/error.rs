// src/error.rs

use std::fmt;

/// Status of a shared-memory channel endpoint.
///
/// One category per failure site. There is deliberately no payload: the
/// wire protocol carries no error detail either, and the OS-level cause
/// is emitted on the `tracing` debug channel at the failure site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmError {
    /// The named region could not be created.
    CreationFailed,
    /// The named region does not exist or could not be opened.
    OpenFailed,
    /// The region was created but could not be sized.
    SizeSetFailed,
    /// The region exists but mapping it into the address space failed.
    MappingFailed,
    /// The ring header in the region is not recognisable (bad capacity).
    InvalidHeader,
}

impl fmt::Display for ShmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShmError::CreationFailed => write!(f, "shared memory creation failed"),
            ShmError::OpenFailed => write!(f, "shared memory open failed"),
            ShmError::SizeSetFailed => write!(f, "shared memory size could not be set"),
            ShmError::MappingFailed => write!(f, "shared memory mapping failed"),
            ShmError::InvalidHeader => write!(f, "ring header is invalid"),
        }
    }
}

impl std::error::Error for ShmError {}
