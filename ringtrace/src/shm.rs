//! POSIX shared-memory plumbing: `shm_open`, `ftruncate`, `mmap`, `mlock`,
//! `shm_unlink`. Kept in one small module so `recorder.rs` reads as the
//! init/record/cleanup state machine without the syscall noise.

use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::unix::io::FromRawFd;

use memmap2::{MmapMut, MmapOptions};

use crate::error::RecorderError;

/// Open (creating if necessary) a POSIX shared-memory object by name and
/// size it to `len` bytes. Returns the backing `File` so the caller can
/// `mmap` it and so the descriptor stays open for the recorder's
/// lifetime, matching the original tracer which keeps its shm fd open
/// until shutdown rather than closing it right after mapping.
pub(crate) fn open_sized(name: &str, len: u64) -> Result<File, RecorderError> {
    let cname = CString::new(name).expect("shm name must not contain NUL");
    let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDWR | libc::O_CREAT, 0o600) };
    if fd < 0 {
        return Err(RecorderError::ShmOpen(cname, io::Error::last_os_error()));
    }
    let file = unsafe { File::from_raw_fd(fd) };
    file.set_len(len)
        .map_err(|e| RecorderError::Truncate(len, e))?;
    Ok(file)
}

/// Map the whole of `file` read-write, shared.
pub(crate) fn map(file: &File, len: u64) -> Result<MmapMut, RecorderError> {
    unsafe {
        MmapOptions::new()
            .len(len as usize)
            .map_mut(file)
            .map_err(|e| RecorderError::Mmap(len, e))
    }
}

/// Best-effort pin of the mapping into physical memory, matching the
/// original tracer: failure is fatal only when the kernel reports
/// `ENOMEM`, and is a no-op warning everywhere else (including, per spec,
/// every non-Linux platform, where this is skipped entirely by the
/// caller).
pub(crate) fn mlock(mmap: &MmapMut) -> Result<(), RecorderError> {
    let rc = unsafe { libc::mlock(mmap.as_ptr() as *const libc::c_void, mmap.len()) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOMEM) {
            return Err(RecorderError::OutOfMemory(err));
        }
        log::warn!("mlock of trace shared memory failed (non-fatal): {}", err);
    }
    Ok(())
}

/// Unlink a named shared-memory object. Called from `cleanup` only when
/// the region was never written to: once a single entry has been
/// recorded, the segment is left behind (unlinked or not, its name stays
/// resolvable until the last mapping of it drops) so an exporter that
/// hasn't polled it yet still can.
pub(crate) fn unlink(name: &str) {
    let cname = CString::new(name).expect("shm name must not contain NUL");
    let rc = unsafe { libc::shm_unlink(cname.as_ptr()) };
    if rc != 0 {
        log::warn!(
            "shm_unlink({:?}) failed: {}",
            name,
            io::Error::last_os_error()
        );
    }
}
