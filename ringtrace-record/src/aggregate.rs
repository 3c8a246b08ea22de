use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use ringtrace_format::{
    FlagsLayout, HistoryLayout, HistorySnapshot, ENTRY_SIZE, MAX_CORES, MAX_TPOINTS,
};

use crate::error::ExporterError;
use crate::input::InputSource;
use crate::poll::{scratch_path, CorePoller};

/// Per-core totals for the final report.
pub struct CoreSummary {
    pub core: usize,
    pub captured: u64,
    pub lost: u64,
    /// Oldest captured entry's tsc, 0 if this core captured nothing.
    pub first_tsc: u64,
    /// Most recently observed entry's tsc, 0 if this core captured nothing.
    pub last_tsc: u64,
    /// Wall time covered by this core's captured entries, in
    /// microseconds: `(last_tsc - first_tsc) / (tsc_rate / 1_000_000)`.
    pub duration_us: u64,
}

/// What the run produced, printed by `main` as the final summary.
pub struct AggregateSummary {
    pub per_core: Vec<CoreSummary>,
    pub total_captured: u64,
    pub total_lost: u64,
    pub output_bytes: u64,
}

/// Startup step 5: if a previous run's output is still sitting at
/// `output_path`, remove it and its `<output_path>-<i>` scratch
/// companions before this run creates fresh ones via `O_CREAT|O_EXCL`.
/// A failed unlink is fatal, same as every other startup failure.
pub fn prepare_output(output_path: &str) -> Result<(), ExporterError> {
    if !Path::new(output_path).exists() {
        return Ok(());
    }
    std::fs::remove_file(output_path)
        .map_err(|e| ExporterError::OutputFile(output_path.to_string(), e))?;
    for core in 0..MAX_CORES {
        let path = scratch_path(output_path, core);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ExporterError::OutputFile(path, e)),
        }
    }
    Ok(())
}

/// Converge every core's scratch-accumulated entries into one canonical
/// output file.
///
/// Unlike the live shared-memory region, the output file's per-core
/// `num_entries` is the true total captured for that core (invariant 4:
/// a persisted entry count, not a ring size echoed back), and
/// `lcore_offsets` is recomputed from those real sizes rather than copied
/// from the live source (invariant 5).
pub fn finalize(
    input: &InputSource,
    pollers: &mut [CorePoller],
    output_path: &str,
) -> Result<AggregateSummary, ExporterError> {
    let mut out = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(output_path)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                ExporterError::OutputExists(output_path.to_string())
            } else {
                ExporterError::OutputFile(output_path.to_string(), e)
            }
        })?;

    let write_err = |e: std::io::Error| ExporterError::OutputFile(output_path.to_string(), e);

    let mut prefix = vec![0u8; FlagsLayout::PREFIX_LEN as usize];
    FlagsLayout::write_prefix(
        &mut prefix,
        input.tsc_rate(),
        &input.tpoint_mask(),
        &input.owner_mask(),
    );
    out.write_all(&prefix).map_err(write_err)?;

    let offsets = FlagsLayout::compute_offsets(|i| pollers[i].captured());
    for off in offsets.iter() {
        out.write_all(&off.to_le_bytes()).map_err(write_err)?;
    }

    // tsc_rate is in Hz; per spec.md's summary formula the denominator is
    // ticks-per-microsecond. Guard against a degenerate sub-MHz tsc_rate
    // making that zero and dividing by it.
    let tsc_per_us = (input.tsc_rate() / 1_000_000).max(1);

    let mut output_bytes = FlagsLayout::SIZE;
    let mut total_captured = 0u64;
    let mut total_lost = 0u64;
    let mut per_core = Vec::with_capacity(MAX_CORES);

    for (i, poller) in pollers.iter_mut().enumerate() {
        let captured = poller.captured();
        let core_buf = input.core_buf(i);
        let mut tpoint_count = Vec::with_capacity(MAX_TPOINTS);
        for t in 0..MAX_TPOINTS {
            tpoint_count.push(InputSource::read_tpoint_count(core_buf, t));
        }

        let snapshot = HistorySnapshot {
            owner_core: i as u16,
            num_entries: captured,
            tpoint_count,
            next_entry: captured,
        };
        let mut header_buf = vec![0u8; HistoryLayout::HEADER_SIZE as usize];
        snapshot.write(&mut header_buf);
        out.write_all(&header_buf).map_err(write_err)?;
        output_bytes += header_buf.len() as u64;

        let copied = poller.drain_into(&mut out)?;
        debug_assert_eq!(copied, captured * ENTRY_SIZE as u64);
        output_bytes += copied;

        let first_tsc = poller.first_tsc();
        let last_tsc = poller.last_tsc();
        total_captured += captured;
        total_lost += poller.lost();
        per_core.push(CoreSummary {
            core: i,
            captured,
            lost: poller.lost(),
            first_tsc,
            last_tsc,
            duration_us: last_tsc.saturating_sub(first_tsc) / tsc_per_us,
        });
    }

    out.flush().map_err(write_err)?;

    for poller in pollers.iter() {
        poller.remove_scratch();
    }

    Ok(AggregateSummary {
        per_core,
        total_captured,
        total_lost,
        output_bytes,
    })
}
