//! Named shared-memory regions via Win32 file mappings.
//!
//! Same API surface as the POSIX backend. Win32 mapping objects are
//! refcounted by the kernel and vanish with their last handle, so there
//! is no unlink step; `destroy` only drops our own keep-alive early.

use std::io;
use std::ptr::NonNull;

use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};
use windows_sys::Win32::System::Memory::{
    CreateFileMappingW, FILE_MAP_ALL_ACCESS, MEMORY_BASIC_INFORMATION,
    MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile, OpenFileMappingW, PAGE_READWRITE, UnmapViewOfFile,
    VirtualQuery,
};

use crate::error::ShmError;
use crate::region::Region;

/// Maximum identifier length, before normalisation.
const NAME_MAX: usize = 62;

/// Normalize an identifier to the Win32 form: no leading `/`.
fn normalize_name(name: &str) -> Option<Vec<u16>> {
    let bare = name.strip_prefix('/').unwrap_or(name);
    if bare.is_empty() || bare.len() > NAME_MAX {
        return None;
    }
    if !bare.is_ascii() || bare.contains('/') {
        return None;
    }
    let mut wide: Vec<u16> = bare.encode_utf16().collect();
    wide.push(0);
    Some(wide)
}

/// A named, mapped shared-memory region.
///
/// Move-only owner of the view and the mapping handle; dropping unmaps
/// and closes. The object itself lives as long as any process holds a
/// handle or view, which is the Win32 equivalent of a persistent region.
pub struct SharedMemory {
    base: NonNull<u8>,
    len: usize,
    mapping: HANDLE,
    name: String,
}

// Safety: the view is process-global; the owner may migrate between
// threads. Not Sync — concurrent use goes through Region views instead.
unsafe impl Send for SharedMemory {}

impl SharedMemory {
    /// Create a named mapping of exactly `size` bytes and map a view.
    ///
    /// `persist` is accepted for API parity with the POSIX backend; on
    /// Win32 lifetime is handle-scoped either way.
    pub fn create(name: &str, size: usize, _persist: bool) -> Result<Self, ShmError> {
        let wide = normalize_name(name).ok_or(ShmError::CreationFailed)?;
        if size == 0 {
            return Err(ShmError::CreationFailed);
        }

        unsafe {
            let mapping = CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                std::ptr::null(),
                PAGE_READWRITE,
                (size as u64 >> 32) as u32,
                size as u32,
                wide.as_ptr(),
            );
            if mapping.is_null() {
                tracing::debug!(
                    name,
                    err = %io::Error::last_os_error(),
                    "CreateFileMappingW failed"
                );
                return Err(ShmError::CreationFailed);
            }

            let view = MapViewOfFile(mapping, FILE_MAP_ALL_ACCESS, 0, 0, size);
            let Some(base) = NonNull::new(view.Value as *mut u8) else {
                tracing::debug!(name, size, err = %io::Error::last_os_error(), "MapViewOfFile failed");
                CloseHandle(mapping);
                return Err(ShmError::MappingFailed);
            };

            tracing::debug!(name, size, "created shared memory region");
            Ok(Self {
                base,
                len: size,
                mapping,
                name: name.strip_prefix('/').unwrap_or(name).to_string(),
            })
        }
    }

    /// Open an existing named mapping and map a view.
    ///
    /// Pass `size` 0 to map the whole object and auto-detect its size
    /// from the view; a non-zero `size` maps exactly that many bytes.
    pub fn open(name: &str, size: usize) -> Result<Self, ShmError> {
        let wide = normalize_name(name).ok_or(ShmError::OpenFailed)?;

        unsafe {
            let mapping = OpenFileMappingW(FILE_MAP_ALL_ACCESS, 0, wide.as_ptr());
            if mapping.is_null() {
                tracing::debug!(name, err = %io::Error::last_os_error(), "OpenFileMappingW failed");
                return Err(ShmError::OpenFailed);
            }

            let view = MapViewOfFile(mapping, FILE_MAP_ALL_ACCESS, 0, 0, size);
            let Some(base) = NonNull::new(view.Value as *mut u8) else {
                tracing::debug!(name, size, err = %io::Error::last_os_error(), "MapViewOfFile failed");
                CloseHandle(mapping);
                return Err(ShmError::MappingFailed);
            };

            let len = if size != 0 {
                size
            } else {
                // A zero-length view spans the whole object; ask the VM
                // layer how large that turned out to be.
                let mut info: MEMORY_BASIC_INFORMATION = std::mem::zeroed();
                let got = VirtualQuery(
                    base.as_ptr() as *const _,
                    &mut info,
                    std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
                );
                if got == 0 || info.RegionSize == 0 {
                    UnmapViewOfFile(view);
                    CloseHandle(mapping);
                    return Err(ShmError::MappingFailed);
                }
                info.RegionSize
            };

            Ok(Self {
                base,
                len,
                mapping,
                name: name.strip_prefix('/').unwrap_or(name).to_string(),
            })
        }
    }

    /// Get a `Region` view of the mapping.
    ///
    /// The view must not outlive this `SharedMemory`.
    #[inline]
    pub fn region(&self) -> Region {
        // Safety: the view is valid for self.len bytes until drop.
        unsafe { Region::from_raw(self.base.as_ptr(), self.len) }
    }

    /// Size of the mapping in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the mapping is zero-length (never the case for a
    /// successfully constructed handle).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The normalized region name, without a leading `/`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remove the name from the namespace.
    ///
    /// No-op on Win32: the mapping object disappears when the last
    /// handle and view close.
    pub fn destroy(&self) {}

    /// Best-effort removal of a named region without opening it.
    ///
    /// No-op on Win32 for the same reason as [`destroy`](Self::destroy).
    pub fn remove(_name: &str) {}
}

impl Drop for SharedMemory {
    fn drop(&mut self) {
        unsafe {
            UnmapViewOfFile(MEMORY_MAPPED_VIEW_ADDRESS {
                Value: self.base.as_ptr() as *mut _,
            });
            CloseHandle(self.mapping);
        }
    }
}
