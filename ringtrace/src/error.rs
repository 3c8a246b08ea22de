use err_derive::Error;

/// Everything that can go wrong setting up or tearing down the shared-memory
/// trace region. `record()` itself never returns a `Result`; a record call
/// against an uninitialized or failed recorder is simply a no-op.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// `num_entries` was zero or not a power of two.
    #[error(display = "num_entries must be a nonzero power of two, got {}", _0)]
    InvalidEntryCount(u64),
    /// `init` was called a second time without an intervening `cleanup`.
    #[error(display = "trace recorder is already initialized")]
    AlreadyInitialized,
    /// `shm_open` failed.
    #[error(display = "shm_open({:?}) failed: {}", _0, _1)]
    ShmOpen(std::ffi::CString, #[error(source)] std::io::Error),
    /// Sizing the shared-memory object with `ftruncate` failed.
    #[error(display = "ftruncate to {} bytes failed: {}", _0, _1)]
    Truncate(u64, #[error(source)] std::io::Error),
    /// `mmap` failed.
    #[error(display = "mmap of {} bytes failed: {}", _0, _1)]
    Mmap(u64, #[error(source)] std::io::Error),
    /// `mlock` failed with `ENOMEM`. Non-Linux platforms and non-`ENOMEM`
    /// failures are logged and otherwise ignored, per spec: pinning the
    /// mapping is best-effort everywhere except this one case.
    #[error(display = "mlock failed, out of memory: {}", _0)]
    OutOfMemory(#[error(source)] std::io::Error),
}
