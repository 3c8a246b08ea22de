use once_cell::sync::Lazy;
use std::time::Instant;

/// Reference point `tsc == 0` would mean "before the process's trace clock
/// started", so we never emit it: [`now`] always returns a nonzero value by
/// construction, since the first call happens strictly after `EPOCH` is
/// established.
static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// The producer's timestamp source.
///
/// The original tracer reads a CPU's hardware cycle counter directly and
/// records a hardware-specific "ticks per second" alongside it so any
/// reader can convert back to wall-clock time. A hardware cycle counter
/// has no portable equivalent in safe Rust, so this substitutes a
/// monotonic nanosecond clock: `tick_rate_hz` is a fixed constant rather
/// than a measured value, but the file format still records it, so readers
/// that only ever consume ringtrace's own output interpret timestamps
/// correctly regardless of what "ticks" are on the underlying platform.
#[inline]
pub fn now() -> u64 {
    Lazy::force(&EPOCH).elapsed().as_nanos() as u64
}

/// Ticks (nanoseconds) per second, for the `tsc_rate` field.
#[inline]
pub const fn tick_rate_hz() -> u64 {
    1_000_000_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_nonzero_and_monotonic() {
        let a = now();
        let b = now();
        assert!(a > 0);
        assert!(b >= a);
    }
}
