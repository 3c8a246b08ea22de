use crate::{HistoryLayout, MAX_CORES, OWNER_MASK_LEN, TPOINT_MASK_LEN};

/// Offset arithmetic and field encode/decode for the file-level
/// `TraceFlags` header: `tsc_rate`, the opaque `tpoint_mask`/`owner_mask`
/// configuration blobs, and `lcore_offsets[MAX_CORES + 1]`.
///
/// `lcore_offsets` is deliberately serialized separately from the rest of
/// the header (see [`FlagsLayout::PREFIX_LEN`] vs [`FlagsLayout::SIZE`]):
/// the aggregation step needs to write "flags except offsets" verbatim
/// from the live file and then append freshly computed offsets, and nothing
/// here relies on `lcore_offsets` actually being the trailing field of a
/// Rust struct in memory.
pub struct FlagsLayout;

impl FlagsLayout {
    /// Offset of `tsc_rate: u64`.
    pub const TSC_RATE_OFFSET: u64 = 0;
    /// Offset of the opaque `tpoint_mask` blob.
    pub const TPOINT_MASK_OFFSET: u64 = 8;
    /// Offset of the opaque `owner_mask` blob.
    pub const OWNER_MASK_OFFSET: u64 = Self::TPOINT_MASK_OFFSET + TPOINT_MASK_LEN as u64;
    /// Offset of the `lcore_offsets[MAX_CORES + 1]: u64` array — also the
    /// byte length of everything that precedes it ("flags except
    /// offsets").
    pub const OFFSETS_OFFSET: u64 = Self::OWNER_MASK_OFFSET + OWNER_MASK_LEN as u64;
    /// Byte length of the header excluding `lcore_offsets`.
    pub const PREFIX_LEN: u64 = Self::OFFSETS_OFFSET;
    /// Total byte length of the `TraceFlags` header, `lcore_offsets`
    /// included.
    pub const SIZE: u64 = Self::OFFSETS_OFFSET + ((MAX_CORES as u64) + 1) * 8;

    /// Write the `tsc_rate`/`tpoint_mask`/`owner_mask` prefix. Does not
    /// touch `lcore_offsets`; write that separately with
    /// [`Self::write_offsets`].
    pub fn write_prefix(
        buf: &mut [u8],
        tsc_rate: u64,
        tpoint_mask: &[u8; TPOINT_MASK_LEN],
        owner_mask: &[u8; OWNER_MASK_LEN],
    ) {
        debug_assert!(buf.len() as u64 >= Self::PREFIX_LEN);
        buf[0..8].copy_from_slice(&tsc_rate.to_le_bytes());
        buf[Self::TPOINT_MASK_OFFSET as usize..][..TPOINT_MASK_LEN].copy_from_slice(tpoint_mask);
        buf[Self::OWNER_MASK_OFFSET as usize..][..OWNER_MASK_LEN].copy_from_slice(owner_mask);
    }

    /// Read `tsc_rate` out of an encoded flags header.
    #[inline]
    pub fn read_tsc_rate(buf: &[u8]) -> u64 {
        u64::from_le_bytes(buf[0..8].try_into().unwrap())
    }

    /// Read the opaque `tpoint_mask` blob.
    pub fn read_tpoint_mask(buf: &[u8]) -> [u8; TPOINT_MASK_LEN] {
        let mut out = [0u8; TPOINT_MASK_LEN];
        out.copy_from_slice(&buf[Self::TPOINT_MASK_OFFSET as usize..][..TPOINT_MASK_LEN]);
        out
    }

    /// Read the opaque `owner_mask` blob.
    pub fn read_owner_mask(buf: &[u8]) -> [u8; OWNER_MASK_LEN] {
        let mut out = [0u8; OWNER_MASK_LEN];
        out.copy_from_slice(&buf[Self::OWNER_MASK_OFFSET as usize..][..OWNER_MASK_LEN]);
        out
    }

    /// Write `lcore_offsets[MAX_CORES + 1]` at its fixed position.
    pub fn write_offsets(buf: &mut [u8], offsets: &[u64; MAX_CORES + 1]) {
        let base = Self::OFFSETS_OFFSET as usize;
        debug_assert!(buf.len() >= base + offsets.len() * 8);
        for (i, off) in offsets.iter().enumerate() {
            let at = base + i * 8;
            buf[at..at + 8].copy_from_slice(&off.to_le_bytes());
        }
    }

    /// Read `lcore_offsets[MAX_CORES + 1]` out of an encoded flags header.
    pub fn read_offsets(buf: &[u8]) -> [u64; MAX_CORES + 1] {
        let base = Self::OFFSETS_OFFSET as usize;
        let mut offsets = [0u64; MAX_CORES + 1];
        for (i, slot) in offsets.iter_mut().enumerate() {
            let at = base + i * 8;
            *slot = u64::from_le_bytes(buf[at..at + 8].try_into().unwrap());
        }
        offsets
    }

    /// Compute `lcore_offsets` for `MAX_CORES` per-core histories whose
    /// entry counts are given by `num_entries(core_index)`.
    ///
    /// `lcore_offsets[0] = sizeof(TraceFlags)`; each subsequent offset
    /// adds the previous core's [`HistoryLayout::history_size`]. The
    /// trailing entry (`lcore_offsets[MAX_CORES]`) encodes the total file
    /// size, per spec.md §3 invariant 5.
    pub fn compute_offsets(mut num_entries: impl FnMut(usize) -> u64) -> [u64; MAX_CORES + 1] {
        let mut offsets = [0u64; MAX_CORES + 1];
        offsets[0] = Self::SIZE;
        for i in 0..MAX_CORES {
            offsets[i + 1] = offsets[i] + HistoryLayout::history_size(num_entries(i));
        }
        offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_excludes_offsets() {
        assert_eq!(FlagsLayout::PREFIX_LEN, FlagsLayout::OFFSETS_OFFSET);
        assert!(FlagsLayout::SIZE > FlagsLayout::PREFIX_LEN);
    }

    #[test]
    fn compute_offsets_matches_invariant_5() {
        let offsets = FlagsLayout::compute_offsets(|_| 16);
        assert_eq!(offsets[0], FlagsLayout::SIZE);
        for i in 0..MAX_CORES {
            let expected = offsets[i] + HistoryLayout::history_size(16);
            assert_eq!(offsets[i + 1], expected);
        }
    }

    #[test]
    fn uneven_core_sizes_produce_uneven_offsets() {
        let sizes = [16u64, 0, 8];
        let offsets = FlagsLayout::compute_offsets(|i| sizes.get(i).copied().unwrap_or(0));
        assert_eq!(offsets[1] - offsets[0], HistoryLayout::history_size(16));
        assert_eq!(offsets[2] - offsets[1], HistoryLayout::history_size(0));
        assert_eq!(offsets[3] - offsets[2], HistoryLayout::history_size(8));
    }

    #[test]
    fn prefix_and_offsets_round_trip() {
        let mut buf = vec![0u8; FlagsLayout::SIZE as usize];
        FlagsLayout::write_prefix(&mut buf, 2_400_000_000, &[1, 2, 3, 4, 5, 6, 7, 8], &[0; 8]);
        let offsets = FlagsLayout::compute_offsets(|_| 1024);
        FlagsLayout::write_offsets(&mut buf, &offsets);

        assert_eq!(FlagsLayout::read_tsc_rate(&buf), 2_400_000_000);
        assert_eq!(
            FlagsLayout::read_tpoint_mask(&buf),
            [1, 2, 3, 4, 5, 6, 7, 8]
        );
        assert_eq!(FlagsLayout::read_offsets(&buf), offsets);
    }
}
