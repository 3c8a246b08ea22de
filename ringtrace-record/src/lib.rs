//! Exporter side of ringtrace: polls a producer's live shared-memory
//! per-core histories and converges them into one canonical trace file.
//!
//! The poll loop itself ([`run`]) is a plain library function so it can be
//! exercised directly in tests, without going through the `trace_record`
//! binary's process lifecycle. `main.rs` only wires up argument parsing,
//! logging and signal handling around it.

pub mod aggregate;
pub mod cli;
pub mod error;
pub mod input;
pub mod poll;
pub mod signal;

use std::time::Duration;

use ringtrace_format::{HistoryLayout, MAX_CORES};

pub use aggregate::AggregateSummary;
pub use cli::Opt;
pub use error::ExporterError;
pub use input::InputSource;
pub use poll::{CorePoller, PollOutcome};
pub use signal::ShutdownFlag;

/// Poll `input` until `shutdown` is requested, then converge everything
/// captured so far into `opt.output`.
///
/// Progress is reported through `on_progress`, called once per core per
/// poll with a non-[`PollOutcome::NoChange`] result, so callers (the
/// binary, or a test) can decide how to surface it rather than this
/// function assuming a terminal is attached.
pub fn run(
    opt: &Opt,
    shutdown: &ShutdownFlag,
    mut on_progress: impl FnMut(usize, PollOutcome),
) -> Result<AggregateSummary, ExporterError> {
    let shm_name = opt
        .resolve_shm_name()
        .map_err(|_| ExporterError::InvalidSource(String::new()))?;
    log::info!("attaching to trace source {:?}", shm_name);
    let input = InputSource::open(&shm_name)?;

    let num_entries: Vec<u64> = (0..MAX_CORES)
        .map(|core| HistoryLayout::read_num_entries(input.core_buf(core)))
        .collect();
    for &n in &num_entries {
        if n != 0 && !ringtrace_format::is_valid_entry_count(n) {
            return Err(ExporterError::InvalidEntryCount(shm_name));
        }
    }

    aggregate::prepare_output(&opt.output)?;

    let mut pollers: Vec<CorePoller> = Vec::with_capacity(MAX_CORES);
    for core in 0..MAX_CORES {
        match CorePoller::new(core, &opt.output) {
            Ok(poller) => pollers.push(poller),
            Err(e) => {
                for created in &pollers {
                    created.remove_scratch();
                }
                return Err(e);
            }
        }
    }

    let result = poll_until_shutdown(&input, &mut pollers, &num_entries, opt, shutdown, &mut on_progress)
        .and_then(|()| aggregate::finalize(&input, &mut pollers, &opt.output));

    if result.is_err() {
        for poller in &pollers {
            poller.remove_scratch();
        }
    }
    result
}

fn poll_until_shutdown(
    input: &InputSource,
    pollers: &mut [CorePoller],
    num_entries: &[u64],
    opt: &Opt,
    shutdown: &ShutdownFlag,
    on_progress: &mut impl FnMut(usize, PollOutcome),
) -> Result<(), ExporterError> {
    loop {
        for core in 0..MAX_CORES {
            if num_entries[core] == 0 {
                continue;
            }
            let outcome = pollers[core].poll(input.core_buf(core), num_entries[core])?;
            if outcome != PollOutcome::NoChange {
                on_progress(core, outcome);
            }
        }
        if shutdown.requested() {
            break;
        }
        std::thread::sleep(Duration::from_millis(opt.poll_interval_ms));
    }

    // One last pass so entries written between the previous poll and the
    // shutdown signal aren't dropped.
    for core in 0..MAX_CORES {
        if num_entries[core] == 0 {
            continue;
        }
        let outcome = pollers[core].poll(input.core_buf(core), num_entries[core])?;
        if outcome != PollOutcome::NoChange {
            on_progress(core, outcome);
        }
    }
    Ok(())
}
