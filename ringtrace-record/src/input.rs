use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::unix::io::FromRawFd;
use std::sync::atomic::{AtomicU64, Ordering};

use memmap2::{Mmap, MmapOptions};
use ringtrace_format::{FlagsLayout, MAX_CORES, OWNER_MASK_LEN, TPOINT_MASK_LEN};

use crate::error::ExporterError;

/// A read-only mapping of a producer's live shared-memory trace region.
///
/// Opened in two stages, matching the original exporter: the file-level
/// header's size doesn't depend on how many entries each core's ring
/// holds, so it's mapped first, alone, just far enough to read
/// `lcore_offsets` — which is what's needed to know the *real* total size
/// to map next.
pub struct InputSource {
    mmap: Mmap,
    _file: File,
    offsets: [u64; MAX_CORES + 1],
    tsc_rate: u64,
    tpoint_mask: [u8; TPOINT_MASK_LEN],
    owner_mask: [u8; OWNER_MASK_LEN],
}

impl InputSource {
    /// Open and validate `shm_name`. Fails with
    /// [`ExporterError::InvalidSource`] if the region's `tsc_rate` is
    /// zero, which only happens if no producer ever called `init` on it.
    pub fn open(shm_name: &str) -> Result<Self, ExporterError> {
        let cname = CString::new(shm_name).expect("shm name must not contain NUL");
        let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDONLY, 0) };
        if fd < 0 {
            return Err(ExporterError::OpenInput(
                shm_name.to_string(),
                io::Error::last_os_error(),
            ));
        }
        let file = unsafe { File::from_raw_fd(fd) };

        let header_mmap = unsafe {
            MmapOptions::new()
                .len(FlagsLayout::SIZE as usize)
                .map(&file)
                .map_err(ExporterError::MapInput)?
        };

        let tsc_rate = FlagsLayout::read_tsc_rate(&header_mmap);
        if tsc_rate == 0 {
            return Err(ExporterError::InvalidSource(shm_name.to_string()));
        }
        let tpoint_mask = FlagsLayout::read_tpoint_mask(&header_mmap);
        let owner_mask = FlagsLayout::read_owner_mask(&header_mmap);
        let offsets = FlagsLayout::read_offsets(&header_mmap);
        let total_len = offsets[MAX_CORES];
        drop(header_mmap);

        log::debug!(
            "remapping {:?} at full size {} bytes (tsc_rate={})",
            shm_name,
            total_len,
            tsc_rate
        );
        let mmap = unsafe {
            MmapOptions::new()
                .len(total_len as usize)
                .map(&file)
                .map_err(ExporterError::MapInput)?
        };

        Ok(InputSource {
            mmap,
            _file: file,
            offsets,
            tsc_rate,
            tpoint_mask,
            owner_mask,
        })
    }

    pub fn tsc_rate(&self) -> u64 {
        self.tsc_rate
    }

    pub fn tpoint_mask(&self) -> [u8; TPOINT_MASK_LEN] {
        self.tpoint_mask
    }

    pub fn owner_mask(&self) -> [u8; OWNER_MASK_LEN] {
        self.owner_mask
    }

    pub fn offsets(&self) -> &[u64; MAX_CORES + 1] {
        &self.offsets
    }

    /// The live byte region for one core's `PerCoreHistory`.
    pub fn core_buf(&self, core: usize) -> &[u8] {
        &self.mmap[self.offsets[core] as usize..self.offsets[core + 1] as usize]
    }

    /// `Acquire` load of `next_entry`, pairing with the producer's
    /// `Release` store: observing a bumped counter also guarantees
    /// observing the entry bytes it describes.
    pub fn read_next_entry(core_buf: &[u8]) -> u64 {
        let off = ringtrace_format::HistoryLayout::NEXT_ENTRY_OFFSET as usize;
        read_u64_atomic(core_buf, off, Ordering::Acquire)
    }

    /// `Relaxed` load of one `tpoint_count` counter. Concurrently
    /// incremented by the producer, so this goes through an atomic load
    /// rather than a plain byte read even though the value is only ever
    /// used for informational reporting.
    pub fn read_tpoint_count(core_buf: &[u8], tpoint_id: usize) -> u64 {
        let off = ringtrace_format::HistoryLayout::tpoint_count_offset(tpoint_id) as usize;
        read_u64_atomic(core_buf, off, Ordering::Relaxed)
    }
}

fn read_u64_atomic(buf: &[u8], offset: usize, ordering: Ordering) -> u64 {
    debug_assert!(offset + 8 <= buf.len());
    let ptr = buf[offset..].as_ptr() as *const AtomicU64;
    unsafe { (*ptr).load(ordering) }
}
