//! Producer side of ringtrace: a lock-free, per-core circular-buffer event
//! recorder backed by POSIX shared memory.
//!
//! Most callers only need the module-level [`init`], [`record`] and
//! [`cleanup`] functions, which manage a single process-wide [`Recorder`]
//! behind a lock-free [`once_cell::sync::OnceCell`]. Tests, and callers
//! that want more than one independent recorder in a process, can
//! construct [`Recorder`] directly instead.
//!
//! `record` never blocks and never allocates: it is safe to call from a
//! signal handler or a hot poll loop. The only thing it does beyond
//! writing bytes is a single `Relaxed` load and a single `Release` store
//! of an atomic counter it already owns exclusively.

mod clock;
mod core_view;
mod error;
mod recorder;
mod shm;

pub use error::RecorderError;
pub use recorder::Recorder;

use once_cell::sync::OnceCell;

static GLOBAL: OnceCell<Recorder> = OnceCell::new();

/// Initialize the process-wide trace recorder.
///
/// `num_entries` is the per-core ring capacity and must be a nonzero power
/// of two; passing `0` disables tracing entirely (subsequent `record`
/// calls become no-ops) without touching shared memory.
///
/// Calling this more than once without an intervening [`cleanup`] returns
/// [`RecorderError::AlreadyInitialized`]; the `Recorder` built for the
/// rejected call is dropped (unmapping its shared memory) before the error
/// is returned.
pub fn init(shm_name: &str, num_entries: u64) -> Result<(), RecorderError> {
    match Recorder::init(shm_name, num_entries)? {
        Some(recorder) => GLOBAL
            .set(recorder)
            .map_err(|_| RecorderError::AlreadyInitialized),
        None => Ok(()),
    }
}

/// Record one event against `core_id`'s history, if the recorder was
/// initialized and `core_id` is in range. A no-op otherwise: neither
/// condition is treated as an error, since both are expected states (an
/// uninstrumented process, or a caller that overcounts its own cores).
#[allow(clippy::too_many_arguments)]
pub fn record(
    core_id: u16,
    tsc: u64,
    tpoint_id: u16,
    poller_id: u16,
    size: u32,
    object_id: u64,
    arg1: u64,
) {
    if let Some(recorder) = GLOBAL.get() {
        recorder.record(core_id, tsc, tpoint_id, poller_id, size, object_id, arg1);
    }
}

/// Decide whether to unlink the shared-memory trace region before
/// process exit: unlinked if nothing was ever recorded through it, left
/// in place otherwise so an exporter can still find it. Does not unmap;
/// the OS reclaims the mapping at process exit regardless.
pub fn cleanup() {
    if let Some(recorder) = GLOBAL.get() {
        recorder.cleanup_in_place();
    }
}
