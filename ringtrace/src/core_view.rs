use std::slice;
use std::sync::atomic::{AtomicU64, Ordering};

use ringtrace_format::{Entry, HistoryLayout, MAX_TPOINTS};

use crate::clock;

/// A bounds-checked window into one core's `PerCoreHistory` region, carved
/// out of the shared mapping once at init time.
///
/// Per spec.md §9's design note: model the per-core pointer as a view
/// object (base, length, core offset) rather than reaching back into the
/// mmap and re-deriving the offset on every call. Bounds are validated
/// here, at construction; `record` trusts them unconditionally.
pub(crate) struct CoreView {
    base: *mut u8,
    region_len: usize,
    num_entries: u64,
}

// Safety: each `CoreView` owns a disjoint, non-overlapping sub-region of
// the shared mapping (carved out via `lcore_offsets`), and exactly one
// thread ever calls `record` on a given core's view (single writer per
// core is a caller contract, not something this type enforces). Readers
// live in a different process entirely and only ever load through their
// own mapping of the same memory.
unsafe impl Send for CoreView {}
unsafe impl Sync for CoreView {}

impl CoreView {
    /// Construct a view over `region_len` bytes starting at
    /// `mmap_base + core_offset`, which must lie entirely within
    /// `mmap_len`. Panics if it doesn't: this is checked once, at startup,
    /// against values this crate itself computed from `lcore_offsets`, so
    /// a failure here means a bug in offset arithmetic, not bad input.
    pub(crate) fn new(
        mmap_base: *mut u8,
        mmap_len: usize,
        core_offset: u64,
        region_len: u64,
        num_entries: u64,
    ) -> Self {
        assert!(
            core_offset + region_len <= mmap_len as u64,
            "core region [{}, {}) out of bounds for mapping of {} bytes",
            core_offset,
            core_offset + region_len,
            mmap_len
        );
        CoreView {
            base: unsafe { mmap_base.add(core_offset as usize) },
            region_len: region_len as usize,
            num_entries,
        }
    }

    #[inline]
    fn header_mut(&self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.base, HistoryLayout::HEADER_SIZE as usize) }
    }

    #[inline]
    fn next_entry_atomic(&self) -> &AtomicU64 {
        let off = HistoryLayout::NEXT_ENTRY_OFFSET as usize;
        unsafe { &*(self.base.add(off) as *const AtomicU64) }
    }

    #[inline]
    fn tpoint_count_atomic(&self, tpoint_id: u16) -> &AtomicU64 {
        let off = HistoryLayout::tpoint_count_offset(tpoint_id as usize) as usize;
        unsafe { &*(self.base.add(off) as *const AtomicU64) }
    }

    #[inline]
    fn entry_slot_mut(&self, slot: u64) -> &mut [u8] {
        let off = HistoryLayout::entry_offset(slot) as usize;
        debug_assert!(off + ringtrace_format::ENTRY_SIZE <= self.region_len);
        unsafe {
            slice::from_raw_parts_mut(self.base.add(off), ringtrace_format::ENTRY_SIZE)
        }
    }

    /// Initialize this core's header in a freshly mapped region.
    pub(crate) fn init_header(&self, owner_core: u16) {
        HistoryLayout::write_header_init(self.header_mut(), owner_core, self.num_entries);
    }

    /// Record one event. Never blocks, never allocates, never returns an
    /// error: a malformed `tpoint_id` only costs the redundant per-tpoint
    /// counter, never the entry itself.
    ///
    /// Single writer per core: the `Relaxed` load of `next_entry` below is
    /// reading this thread's own last store, which every memory model
    /// guarantees sees the most recent value without any synchronization.
    /// The `Release` store after the entry bytes are written is what
    /// matters, pairing with the exporter's `Acquire` load so it never
    /// observes a `next_entry` bump without also observing the entry it
    /// describes.
    pub(crate) fn record(
        &self,
        tsc: u64,
        tpoint_id: u16,
        poller_id: u16,
        size: u32,
        object_id: u64,
        arg1: u64,
    ) {
        let tsc = if tsc == 0 { clock::now() } else { tsc };
        let seqn = self.next_entry_atomic().load(Ordering::Relaxed);
        let slot = ringtrace_format::slot_index(seqn, self.num_entries);

        let entry = Entry {
            tsc,
            tpoint_id,
            poller_id,
            size,
            object_id,
            arg1,
        };
        entry.write_le(self.entry_slot_mut(slot));

        if (tpoint_id as usize) < MAX_TPOINTS {
            self.tpoint_count_atomic(tpoint_id).fetch_add(1, Ordering::Relaxed);
        }

        self.next_entry_atomic().store(seqn + 1, Ordering::Release);
    }
}
