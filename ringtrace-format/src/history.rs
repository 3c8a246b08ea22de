use crate::{ENTRY_SIZE, MAX_TPOINTS};

/// Offset arithmetic and field encode/decode for one `PerCoreHistory`
/// region: `owner_core`, `num_entries`, `tpoint_count[MAX_TPOINTS]`,
/// `next_entry`, followed by `num_entries` [`crate::Entry`] slots.
///
/// This is a zero-sized namespace, not a value type: the live header lives
/// directly in a shared-memory byte region (read/written through the
/// `ringtrace` crate's atomics), and the exporter's decoded copy lives in
/// [`HistorySnapshot`]. Neither representation round-trips through a
/// whole-struct copy; both go through the field accessors here.
pub struct HistoryLayout;

impl HistoryLayout {
    /// `owner_core: u16` at offset 0.
    pub const OWNER_CORE_OFFSET: u64 = 0;
    /// `num_entries: u64`, 8-byte aligned following the 2-byte
    /// `owner_core` and its implicit padding.
    pub const NUM_ENTRIES_OFFSET: u64 = 8;
    /// Start of the `tpoint_count[MAX_TPOINTS]: u64` array.
    pub const TPOINT_COUNT_OFFSET: u64 = 16;
    /// `next_entry: u64`, immediately following the tpoint counters.
    pub const NEXT_ENTRY_OFFSET: u64 =
        Self::TPOINT_COUNT_OFFSET + (MAX_TPOINTS as u64) * 8;
    /// Total size of the fixed-size header, before the entry array.
    pub const HEADER_SIZE: u64 = Self::NEXT_ENTRY_OFFSET + 8;

    /// Byte offset, relative to the start of this history's region, of
    /// the entry array.
    #[inline]
    pub const fn entries_offset() -> u64 {
        Self::HEADER_SIZE
    }

    /// Total size of one per-core history: header plus `num_entries`
    /// entries, rounded to an 8-byte boundary.
    #[inline]
    pub fn history_size(num_entries: u64) -> u64 {
        crate::align_up_8(Self::HEADER_SIZE + num_entries * ENTRY_SIZE as u64)
    }

    /// Byte offset of the `tpoint_count[tpoint_id]` counter.
    #[inline]
    pub fn tpoint_count_offset(tpoint_id: usize) -> u64 {
        Self::TPOINT_COUNT_OFFSET + (tpoint_id as u64) * 8
    }

    /// Byte offset of the `entries[slot]` entry, given the circular slot
    /// index (already reduced modulo `num_entries`).
    #[inline]
    pub fn entry_offset(slot: u64) -> u64 {
        Self::entries_offset() + slot * ENTRY_SIZE as u64
    }

    /// Zero-initialize a freshly-mapped history region's header fields:
    /// `owner_core` and `num_entries` are set, `tpoint_count` and
    /// `next_entry` are zeroed explicitly (a freshly-`mmap`'d,
    /// zero-filled page already reads as zero, but tests that build a
    /// history over a non-zeroed buffer rely on this being explicit).
    pub fn write_header_init(buf: &mut [u8], owner_core: u16, num_entries: u64) {
        debug_assert!(buf.len() as u64 >= Self::HEADER_SIZE);
        buf[0..2].copy_from_slice(&owner_core.to_le_bytes());
        buf[2..8].copy_from_slice(&[0u8; 6]);
        buf[8..16].copy_from_slice(&num_entries.to_le_bytes());
        for i in 0..MAX_TPOINTS {
            let off = Self::tpoint_count_offset(i) as usize;
            buf[off..off + 8].copy_from_slice(&0u64.to_le_bytes());
        }
        let ne_off = Self::NEXT_ENTRY_OFFSET as usize;
        buf[ne_off..ne_off + 8].copy_from_slice(&0u64.to_le_bytes());
    }

    /// Read `owner_core` out of an encoded header.
    #[inline]
    pub fn read_owner_core(buf: &[u8]) -> u16 {
        u16::from_le_bytes(buf[0..2].try_into().unwrap())
    }

    /// Read `num_entries` out of an encoded header.
    #[inline]
    pub fn read_num_entries(buf: &[u8]) -> u64 {
        u64::from_le_bytes(buf[8..16].try_into().unwrap())
    }

    /// Read `next_entry` out of an encoded header.
    #[inline]
    pub fn read_next_entry(buf: &[u8]) -> u64 {
        let off = Self::NEXT_ENTRY_OFFSET as usize;
        u64::from_le_bytes(buf[off..off + 8].try_into().unwrap())
    }

    /// Read one `tpoint_count[tpoint_id]` counter out of an encoded
    /// header.
    #[inline]
    pub fn read_tpoint_count(buf: &[u8], tpoint_id: usize) -> u64 {
        let off = Self::tpoint_count_offset(tpoint_id) as usize;
        u64::from_le_bytes(buf[off..off + 8].try_into().unwrap())
    }
}

/// An owned, decoded copy of one core's history header, used by the
/// exporter to accumulate `out_history[i]` across polls before it is
/// re-encoded into the aggregate file.
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct HistorySnapshot {
    /// Redundant core identifier, expected to equal this history's index.
    pub owner_core: u16,
    /// Capacity this snapshot was taken against. The exporter overwrites
    /// this with the recorded entry count before persisting (invariant 4
    /// in spec.md §3: the persisted field is a total count, not a ring
    /// size).
    pub num_entries: u64,
    /// Per-tpoint event counters, copied verbatim from the live header.
    pub tpoint_count: std::vec::Vec<u64>,
    /// Last observed `next_entry` sequence counter.
    pub next_entry: u64,
}

#[cfg(feature = "std")]
impl HistorySnapshot {
    /// Decode a snapshot from an encoded header region.
    pub fn read(buf: &[u8]) -> Self {
        let mut tpoint_count = std::vec::Vec::with_capacity(MAX_TPOINTS);
        for i in 0..MAX_TPOINTS {
            tpoint_count.push(HistoryLayout::read_tpoint_count(buf, i));
        }
        HistorySnapshot {
            owner_core: HistoryLayout::read_owner_core(buf),
            num_entries: HistoryLayout::read_num_entries(buf),
            tpoint_count,
            next_entry: HistoryLayout::read_next_entry(buf),
        }
    }

    /// Encode this snapshot's header fields into `buf` (the entry array
    /// that follows is written separately by streaming scratch-file
    /// contents).
    pub fn write(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() as u64 >= HistoryLayout::HEADER_SIZE);
        buf[0..2].copy_from_slice(&self.owner_core.to_le_bytes());
        buf[2..8].copy_from_slice(&[0u8; 6]);
        buf[8..16].copy_from_slice(&self.num_entries.to_le_bytes());
        for (i, count) in self.tpoint_count.iter().enumerate().take(MAX_TPOINTS) {
            let off = HistoryLayout::tpoint_count_offset(i) as usize;
            buf[off..off + 8].copy_from_slice(&count.to_le_bytes());
        }
        let ne_off = HistoryLayout::NEXT_ENTRY_OFFSET as usize;
        buf[ne_off..ne_off + 8].copy_from_slice(&self.next_entry.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Entry;

    #[test]
    fn header_layout_matches_spec_order() {
        // owner_core(u16) + pad, num_entries(u64), tpoint_count[], next_entry(u64)
        assert_eq!(HistoryLayout::OWNER_CORE_OFFSET, 0);
        assert_eq!(HistoryLayout::NUM_ENTRIES_OFFSET, 8);
        assert_eq!(HistoryLayout::TPOINT_COUNT_OFFSET, 16);
        assert_eq!(
            HistoryLayout::NEXT_ENTRY_OFFSET,
            16 + (MAX_TPOINTS as u64) * 8
        );
    }

    #[test]
    fn history_size_is_8_aligned_and_includes_entries() {
        let n = 64u64;
        let size = HistoryLayout::history_size(n);
        assert_eq!(size % 8, 0);
        assert_eq!(
            size,
            HistoryLayout::HEADER_SIZE + n * ENTRY_SIZE as u64
        );
    }

    #[test]
    fn write_and_read_header_round_trips() {
        let size = HistoryLayout::history_size(16) as usize;
        let mut buf = vec![0xAAu8; size];
        HistoryLayout::write_header_init(&mut buf, 3, 16);
        assert_eq!(HistoryLayout::read_owner_core(&buf), 3);
        assert_eq!(HistoryLayout::read_num_entries(&buf), 16);
        assert_eq!(HistoryLayout::read_next_entry(&buf), 0);
        assert_eq!(HistoryLayout::read_tpoint_count(&buf, 0), 0);
        assert_eq!(HistoryLayout::read_tpoint_count(&buf, MAX_TPOINTS - 1), 0);
    }

    #[test]
    fn entry_offset_advances_by_entry_size() {
        let base = HistoryLayout::entries_offset();
        assert_eq!(HistoryLayout::entry_offset(0), base);
        assert_eq!(HistoryLayout::entry_offset(1), base + ENTRY_SIZE as u64);
        assert_eq!(HistoryLayout::entry_offset(5), base + 5 * ENTRY_SIZE as u64);
    }

    #[test]
    fn snapshot_round_trips() {
        let size = HistoryLayout::history_size(8) as usize;
        let mut buf = vec![0u8; size];
        HistoryLayout::write_header_init(&mut buf, 2, 8);

        let mut entry = Entry::default();
        entry.tsc = 55;
        entry.write_le(&mut buf[HistoryLayout::entry_offset(0) as usize..]);

        let mut snap = HistorySnapshot::read(&buf);
        snap.num_entries = 1;
        snap.next_entry = 1;

        let mut out = vec![0u8; HistoryLayout::HEADER_SIZE as usize];
        snap.write(&mut out);
        let decoded = HistorySnapshot::read(&out);
        assert_eq!(decoded.owner_core, 2);
        assert_eq!(decoded.num_entries, 1);
        assert_eq!(decoded.next_entry, 1);
    }
}
