//! Double-mapped backing store for the contiguous ring.
//!
//! One physical buffer is mapped twice back to back inside a reserved
//! virtual range, so a read of up to one buffer length starting anywhere
//! in the first copy continues seamlessly into the second copy instead of
//! wrapping. The page before and the page after the two copies stay
//! PROT_NONE and fault on any stray access.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr;

/// The two adjacent views of one shared buffer, plus the guard pages
/// around them.
pub(super) struct DoubleMap {
    base: *mut u8,
    data: *mut u8,
    len: usize,
    reserved: usize,
}

// The mapping is owned exclusively; all shared access goes through the
// ring's mutex.
unsafe impl Send for DoubleMap {}
unsafe impl Sync for DoubleMap {}

impl DoubleMap {
    /// Map `len` bytes (a page multiple) twice, with guard pages.
    pub(super) fn new(len: usize) -> io::Result<Self> {
        let page = page_size();
        debug_assert!(len > 0 && len % page == 0);

        let fd = backing_fd(len)?;
        let reserved = 2 * page + 2 * len;

        unsafe {
            // reserve an address range large enough for both copies and
            // both guards; everything stays inaccessible until remapped
            let base = libc::mmap(
                ptr::null_mut(),
                reserved,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            );
            if base == libc::MAP_FAILED {
                return Err(io::Error::last_os_error());
            }
            let base = base as *mut u8;

            for offset in [page, page + len] {
                let view = libc::mmap(
                    base.add(offset) as *mut libc::c_void,
                    len,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED | libc::MAP_FIXED,
                    fd.as_raw_fd(),
                    0,
                );
                if view == libc::MAP_FAILED {
                    let err = io::Error::last_os_error();
                    libc::munmap(base as *mut libc::c_void, reserved);
                    return Err(err);
                }
            }

            // the fd closes on drop; the mappings keep the memory alive
            Ok(Self {
                base,
                data: base.add(page),
                len,
                reserved,
            })
        }
    }

    /// Start of the first copy. `len()` bytes may be read past any offset
    /// in `[0, len())`.
    pub(super) fn data(&self) -> *mut u8 {
        self.data
    }

    /// Length of one copy in bytes.
    pub(super) fn len(&self) -> usize {
        self.len
    }
}

impl Drop for DoubleMap {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.reserved);
        }
    }
}

pub(super) fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

/// Anonymous shared memory to back the two views.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn backing_fd(len: usize) -> io::Result<OwnedFd> {
    let fd = unsafe {
        libc::memfd_create(
            b"rustykal-ring\0".as_ptr() as *const libc::c_char,
            libc::MFD_CLOEXEC,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };
    grow_to(&fd, len)?;
    Ok(fd)
}

/// POSIX shared memory fallback; the name is unlinked immediately so
/// nothing outlives the fd.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn backing_fd(len: usize) -> io::Result<OwnedFd> {
    use std::ffi::CString;
    use std::sync::atomic::{AtomicU32, Ordering};

    static SEQ: AtomicU32 = AtomicU32::new(0);

    let name = format!(
        "/rustykal-{}-{}",
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    );
    let cname = CString::new(name).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;

    let fd = unsafe {
        libc::shm_open(
            cname.as_ptr(),
            libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
            libc::S_IRUSR | libc::S_IWUSR,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };
    unsafe { libc::shm_unlink(cname.as_ptr()) };
    grow_to(&fd, len)?;
    Ok(fd)
}

fn grow_to(fd: &OwnedFd, len: usize) -> io::Result<()> {
    if unsafe { libc::ftruncate(fd.as_raw_fd(), len as libc::off_t) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
