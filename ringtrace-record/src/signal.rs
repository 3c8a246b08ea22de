use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shutdown flag set from a `SIGINT`/`SIGTERM` handler, polled between
/// iterations of the main poll loop. Equivalent to the original exporter's
/// raw `sigaction`-based `__shutdown_signal`, but wired through the
/// `ctrlc` crate's portable handler registration instead.
#[derive(Clone)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    /// Install the signal handler and return a flag the poll loop can
    /// check. `ctrlc`'s `termination` feature additionally handles
    /// `SIGTERM` on Unix, matching the original's handling of both
    /// signals.
    pub fn install() -> Result<Self, ctrlc::Error> {
        let flag = Arc::new(AtomicBool::new(false));
        let flag_for_handler = flag.clone();
        ctrlc::set_handler(move || {
            flag_for_handler.store(true, Ordering::SeqCst);
        })?;
        Ok(ShutdownFlag(flag))
    }

    /// Construct a flag with no handler installed, for tests that need to
    /// trigger shutdown programmatically instead of via a real signal.
    #[cfg(test)]
    pub fn new_unarmed() -> Self {
        ShutdownFlag(Arc::new(AtomicBool::new(false)))
    }

    pub fn requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}
