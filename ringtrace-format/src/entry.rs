/// A single fixed-size traced event.
///
/// An entry is self-contained; there is no variable-length payload. Fields
/// are producer-assigned and opaque to this crate beyond their types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Entry {
    /// Producer-observed timestamp counter at record time.
    pub tsc: u64,
    /// Opaque event type, producer-assigned. 0 is reserved "no entry".
    pub tpoint_id: u16,
    /// Opaque context id.
    pub poller_id: u16,
    /// Opaque size field.
    pub size: u32,
    /// Opaque correlation id.
    pub object_id: u64,
    /// Opaque event argument.
    pub arg1: u64,
}

impl Entry {
    /// Encode this entry as little-endian bytes into `dst`.
    ///
    /// `dst` must be at least [`crate::ENTRY_SIZE`] bytes long.
    pub fn write_le(&self, dst: &mut [u8]) {
        debug_assert!(dst.len() >= crate::ENTRY_SIZE);
        dst[0..8].copy_from_slice(&self.tsc.to_le_bytes());
        dst[8..10].copy_from_slice(&self.tpoint_id.to_le_bytes());
        dst[10..12].copy_from_slice(&self.poller_id.to_le_bytes());
        dst[12..16].copy_from_slice(&self.size.to_le_bytes());
        dst[16..24].copy_from_slice(&self.object_id.to_le_bytes());
        dst[24..32].copy_from_slice(&self.arg1.to_le_bytes());
    }

    /// Decode an entry from little-endian bytes.
    ///
    /// `src` must be at least [`crate::ENTRY_SIZE`] bytes long.
    pub fn read_le(src: &[u8]) -> Self {
        debug_assert!(src.len() >= crate::ENTRY_SIZE);
        Entry {
            tsc: u64::from_le_bytes(src[0..8].try_into().unwrap()),
            tpoint_id: u16::from_le_bytes(src[8..10].try_into().unwrap()),
            poller_id: u16::from_le_bytes(src[10..12].try_into().unwrap()),
            size: u32::from_le_bytes(src[12..16].try_into().unwrap()),
            object_id: u64::from_le_bytes(src[16..24].try_into().unwrap()),
            arg1: u64::from_le_bytes(src[24..32].try_into().unwrap()),
        }
    }

    /// Peek just the `tsc` field out of an encoded entry, without decoding
    /// the rest. Used by the exporter's bookkeeping of first/last entry
    /// timestamps, which never needs the other fields.
    pub fn read_tsc_le(src: &[u8]) -> u64 {
        debug_assert!(src.len() >= 8);
        u64::from_le_bytes(src[0..8].try_into().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let e = Entry {
            tsc: 0x0102_0304_0506_0708,
            tpoint_id: 7,
            poller_id: 42,
            size: 99,
            object_id: 0xdead_beef_cafe_babe,
            arg1: 1234,
        };
        let mut buf = [0u8; crate::ENTRY_SIZE];
        e.write_le(&mut buf);
        assert_eq!(Entry::read_le(&buf), e);
        assert_eq!(Entry::read_tsc_le(&buf), e.tsc);
    }

    #[test]
    fn zero_entry_has_zero_tsc() {
        let e = Entry::default();
        let mut buf = [0xffu8; crate::ENTRY_SIZE];
        e.write_le(&mut buf);
        assert_eq!(Entry::read_tsc_le(&buf), 0);
    }
}
