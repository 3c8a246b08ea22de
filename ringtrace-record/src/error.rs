use err_derive::Error;

/// Everything that can make the exporter stop. The `main` binary reports
/// these as `<kind>: <detail>` on stderr and exits 1; nothing here is
/// recoverable mid-run.
#[derive(Debug, Error)]
pub enum ExporterError {
    /// The input shared-memory object couldn't be opened at all.
    #[error(display = "cannot open input source {:?}: {}", _0, _1)]
    OpenInput(String, #[error(source)] std::io::Error),
    /// Mapping the input source failed.
    #[error(display = "cannot map input source: {}", _0)]
    MapInput(#[error(source)] std::io::Error),
    /// The input source's flags header reported a zero `tsc_rate`, which
    /// only ever happens if it was never initialized by a producer.
    #[error(display = "input source {:?} was never initialized (tsc_rate is zero)", _0)]
    InvalidSource(String),
    /// The input source's recorded `num_entries` is not a power of two.
    #[error(display = "input source {:?} has an invalid per-core entry count", _0)]
    InvalidEntryCount(String),
    /// A core's `next_entry` went backwards between two polls: the
    /// producer reinitialized its region (process restart) or the region
    /// was corrupted. Fatal: the run aborts rather than guessing which
    /// entries are still trustworthy.
    #[error(display = "core {}: next_entry went backwards (producer restart or corruption)", _0)]
    Rollback(usize),
    /// Creating a scratch file for a core's accumulated entries failed.
    #[error(display = "cannot create scratch file: {}", _0)]
    ScratchFile(#[error(source)] std::io::Error),
    /// A read or write against a scratch file failed after EINTR retry.
    #[error(display = "scratch file I/O failed: {}", _0)]
    ScratchIo(#[error(source)] std::io::Error),
    /// Creating or writing the final output file failed, or unlinking a
    /// stale one left over from a previous run failed.
    #[error(display = "cannot write output file {:?}: {}", _0, _1)]
    OutputFile(String, #[error(source)] std::io::Error),
    /// The output path already existed at aggregation time despite the
    /// startup cleanup pass; startup and aggregation ran concurrently
    /// against the same path, which is not supported.
    #[error(display = "output file {:?} already exists", _0)]
    OutputExists(String),
}
