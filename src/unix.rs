//! Named shared-memory regions via POSIX `shm_open`.
//!
//! The producer creates a named region; the consumer opens it by the same
//! name. Both ends map read/write — the consumer writes the `tail` cursor
//! even though it only reads messages.

use std::ffi::CString;
use std::io;
use std::ptr::NonNull;

use crate::error::ShmError;
use crate::region::Region;

/// Maximum identifier length, before the platform prefix.
const NAME_MAX: usize = 62;

/// Normalize an identifier to the POSIX form: a single leading `/`.
///
/// Rejects empty, non-ASCII, over-long names and names with interior
/// slashes; `shm_open` would refuse most of those anyway, but with less
/// helpful failure modes.
fn normalize_name(name: &str) -> Option<CString> {
    let bare = name.strip_prefix('/').unwrap_or(name);
    if bare.is_empty() || bare.len() > NAME_MAX {
        return None;
    }
    if !bare.is_ascii() || bare.contains('/') {
        return None;
    }
    CString::new(format!("/{bare}")).ok()
}

/// A named, mapped shared-memory region.
///
/// Move-only owner of the mapping: dropping unmaps, and if the region was
/// created non-persistent, also unlinks the name. A consumer that opened
/// the region never unlinks it on drop.
pub struct SharedMemory {
    base: NonNull<u8>,
    len: usize,
    name: CString,
    created: bool,
    persist: bool,
}

// Safety: the mapping is process-global; the owner may migrate between
// threads. Not Sync — concurrent use goes through Region views instead.
unsafe impl Send for SharedMemory {}

impl SharedMemory {
    /// Create a named region of exactly `size` bytes and map it.
    ///
    /// A stale region under the same name is unlinked first: some kernels
    /// refuse to resize an existing object, so create must start fresh.
    /// With `persist` false the name is unlinked again when this handle
    /// drops.
    pub fn create(name: &str, size: usize, persist: bool) -> Result<Self, ShmError> {
        let c_name = normalize_name(name).ok_or(ShmError::CreationFailed)?;
        if size == 0 {
            return Err(ShmError::CreationFailed);
        }

        unsafe {
            libc::shm_unlink(c_name.as_ptr());

            let fd = libc::shm_open(c_name.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o600);
            if fd == -1 {
                tracing::debug!(
                    name,
                    err = %io::Error::last_os_error(),
                    "shm_open(O_CREAT) failed"
                );
                return Err(ShmError::CreationFailed);
            }

            if libc::ftruncate(fd, size as libc::off_t) == -1 {
                tracing::debug!(name, size, err = %io::Error::last_os_error(), "ftruncate failed");
                libc::close(fd);
                libc::shm_unlink(c_name.as_ptr());
                return Err(ShmError::SizeSetFailed);
            }

            let base = match map_fd(fd, size) {
                Some(base) => base,
                None => {
                    tracing::debug!(name, size, err = %io::Error::last_os_error(), "mmap failed");
                    libc::close(fd);
                    libc::shm_unlink(c_name.as_ptr());
                    return Err(ShmError::MappingFailed);
                }
            };
            // The mapping keeps the object alive; the fd is no longer needed.
            libc::close(fd);

            tracing::debug!(name, size, "created shared memory region");
            Ok(Self {
                base,
                len: size,
                name: c_name,
                created: true,
                persist,
            })
        }
    }

    /// Open an existing named region and map it.
    ///
    /// Pass `size` 0 to auto-detect the region size from the object's
    /// stat; a non-zero `size` maps exactly that many bytes.
    pub fn open(name: &str, size: usize) -> Result<Self, ShmError> {
        let c_name = normalize_name(name).ok_or(ShmError::OpenFailed)?;

        unsafe {
            let fd = libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0o600);
            if fd == -1 {
                tracing::debug!(name, err = %io::Error::last_os_error(), "shm_open failed");
                return Err(ShmError::OpenFailed);
            }

            let mut size = size;
            if size == 0 {
                let mut st: libc::stat = std::mem::zeroed();
                if libc::fstat(fd, &mut st) == 0 && st.st_size > 0 {
                    size = st.st_size as usize;
                }
            }
            if size == 0 {
                libc::close(fd);
                return Err(ShmError::OpenFailed);
            }

            let base = match map_fd(fd, size) {
                Some(base) => base,
                None => {
                    tracing::debug!(name, size, err = %io::Error::last_os_error(), "mmap failed");
                    libc::close(fd);
                    return Err(ShmError::MappingFailed);
                }
            };
            libc::close(fd);

            Ok(Self {
                base,
                len: size,
                name: c_name,
                created: false,
                persist: true,
            })
        }
    }

    /// Get a `Region` view of the mapping.
    ///
    /// The view must not outlive this `SharedMemory`.
    #[inline]
    pub fn region(&self) -> Region {
        // Safety: the mapping is valid for self.len bytes until drop.
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

    /// The normalized region name, including the leading `/`.
    pub fn name(&self) -> &str {
        self.name.to_str().unwrap_or("")
    }

    /// Unlink the name from the namespace.
    ///
    /// Future opens fail; mappings already held (ours included) stay
    /// valid until unmapped.
    pub fn destroy(&self) {
        unsafe {
            libc::shm_unlink(self.name.as_ptr());
        }
        tracing::debug!(name = %self.name(), "unlinked shared memory region");
    }

    /// Best-effort unlink of a named region without opening it.
    pub fn remove(name: &str) {
        if let Some(c_name) = normalize_name(name) {
            unsafe {
                libc::shm_unlink(c_name.as_ptr());
            }
        }
    }
}

impl Drop for SharedMemory {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.len);
        }
        if self.created && !self.persist {
            self.destroy();
        }
    }
}

/// Map `size` bytes of `fd` read/write, shared.
unsafe fn map_fd(fd: libc::c_int, size: usize) -> Option<NonNull<u8>> {
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return None;
    }
    NonNull::new(ptr as *mut u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("bytering-test-{}-{tag}", std::process::id())
    }

    #[test]
    fn normalize_adds_leading_slash() {
        assert_eq!(normalize_name("chan").unwrap().to_str().unwrap(), "/chan");
        assert_eq!(normalize_name("/chan").unwrap().to_str().unwrap(), "/chan");
    }

    #[test]
    fn normalize_rejects_bad_names() {
        assert!(normalize_name("").is_none());
        assert!(normalize_name("/").is_none());
        assert!(normalize_name("a/b").is_none());
        assert!(normalize_name("héllo").is_none());
        assert!(normalize_name(&"x".repeat(63)).is_none());
        assert!(normalize_name(&"x".repeat(62)).is_some());
    }

    #[test]
    fn create_open_roundtrip() {
        let name = unique_name("roundtrip");
        let created = SharedMemory::create(&name, 4096, true).unwrap();
        assert_eq!(created.len(), 4096);

        unsafe {
            *created.region().as_ptr().add(100) = 0xAB;
        }

        let opened = SharedMemory::open(&name, 0).unwrap();
        assert_eq!(opened.len(), 4096, "size auto-detected from stat");
        assert_eq!(unsafe { *opened.region().as_ptr().add(100) }, 0xAB);

        created.destroy();
        drop(opened);
    }

    #[test]
    fn open_missing_region_fails() {
        let name = unique_name("missing");
        assert_eq!(
            SharedMemory::open(&name, 0).err(),
            Some(ShmError::OpenFailed)
        );
    }

    #[test]
    fn non_persistent_create_unlinks_on_drop() {
        let name = unique_name("ephemeral");
        {
            let _shm = SharedMemory::create(&name, 1024, false).unwrap();
            assert!(SharedMemory::open(&name, 0).is_ok());
        }
        assert_eq!(
            SharedMemory::open(&name, 0).err(),
            Some(ShmError::OpenFailed)
        );
    }

    #[test]
    fn create_replaces_stale_region() {
        let name = unique_name("stale");
        let first = SharedMemory::create(&name, 1024, true).unwrap();
        drop(first);

        // A leftover region with a different size must not survive create.
        let second = SharedMemory::create(&name, 2048, true).unwrap();
        assert_eq!(second.len(), 2048);
        let opened = SharedMemory::open(&name, 0).unwrap();
        assert_eq!(opened.len(), 2048);

        second.destroy();
    }

    #[test]
    fn destroy_blocks_future_opens() {
        let name = unique_name("destroy");
        let shm = SharedMemory::create(&name, 1024, true).unwrap();
        shm.destroy();
        assert_eq!(
            SharedMemory::open(&name, 0).err(),
            Some(ShmError::OpenFailed)
        );
        // Our own mapping is still usable after the unlink.
        unsafe {
            *shm.region().as_ptr() = 1;
        }
    }

    #[test]
    fn remove_is_best_effort() {
        let name = unique_name("remove");
        SharedMemory::remove(&name); // nothing there, no panic
        let _shm = SharedMemory::create(&name, 1024, true).unwrap();
        SharedMemory::remove(&name);
        assert_eq!(
            SharedMemory::open(&name, 0).err(),
            Some(ShmError::OpenFailed)
        );
    }
}
