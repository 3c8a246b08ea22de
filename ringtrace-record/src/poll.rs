use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;

use ringtrace_format::{slot_index, Entry, HistoryLayout, ENTRY_SIZE};

use crate::error::ExporterError;
use crate::input::InputSource;

/// What one poll of a core's live history produced, for progress
/// reporting and the invariant tests in `lib.rs`'s integration suite.
///
/// A rollback (`next_entry` going backwards) is not represented here: it
/// is fatal to the whole run, per spec, so it surfaces as an
/// [`ExporterError::Rollback`] from [`CorePoller::poll`] instead of an
/// outcome the caller can shrug off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// `next_entry` hadn't moved since the last poll.
    NoChange,
    /// New entries were captured; `lost` is nonzero only when the gap
    /// since the last poll exceeded the ring's capacity.
    Captured { appended: u64, lost: u64 },
}

/// This core's scratch-file path, `<out_path>-<core>`, per spec.md §6's
/// persisted-state layout.
pub(crate) fn scratch_path(out_path: &str, core: usize) -> String {
    format!("{}-{}", out_path, core)
}

/// Per-core poll state: how much of this core's history has already been
/// pulled into its scratch file, the scratch file itself, and the first
/// and last observed entry timestamps for the summary report.
///
/// Each core's captured entries accumulate in their own scratch file
/// across the whole run, rather than in memory, so a long-running export
/// doesn't hold the entire trace resident at once. They're streamed into
/// the final output file only once, at [`crate::aggregate`] time.
pub struct CorePoller {
    core: usize,
    path: String,
    scratch: File,
    last_seen: Option<u64>,
    captured: u64,
    lost: u64,
    first_tsc: Option<u64>,
    last_tsc: u64,
}

impl CorePoller {
    /// Create this core's scratch file at `<out_path>-<core>` with
    /// `O_CREAT | O_EXCL`, mode 0600. A pre-existing file at this path is
    /// a startup-ordering bug: [`crate::aggregate::prepare_output`] is
    /// expected to have cleared any companions of a stale output before
    /// pollers are created.
    pub fn new(core: usize, out_path: &str) -> Result<Self, ExporterError> {
        let path = scratch_path(out_path, core);
        let scratch = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)
            .map_err(ExporterError::ScratchFile)?;
        Ok(CorePoller {
            core,
            path,
            scratch,
            last_seen: None,
            captured: 0,
            lost: 0,
            first_tsc: None,
            last_tsc: 0,
        })
    }

    pub fn core(&self) -> usize {
        self.core
    }

    pub fn captured(&self) -> u64 {
        self.captured
    }

    pub fn lost(&self) -> u64 {
        self.lost
    }

    /// Timestamp of the oldest entry this core ever captured, or 0 if
    /// nothing has been captured yet.
    pub fn first_tsc(&self) -> u64 {
        self.first_tsc.unwrap_or(0)
    }

    /// Timestamp of the most recently observed entry as of the last
    /// poll, or 0 if nothing has been captured yet.
    pub fn last_tsc(&self) -> u64 {
        self.last_tsc
    }

    /// Poll this core's live history once, appending any newly visible
    /// entries to the scratch file.
    pub fn poll(&mut self, core_buf: &[u8], num_entries: u64) -> Result<PollOutcome, ExporterError> {
        let live = InputSource::read_next_entry(core_buf);

        let (start, count, lost) = match self.last_seen {
            None => first_capture(live, num_entries),
            Some(prev) if live == prev => return Ok(PollOutcome::NoChange),
            Some(prev) if live < prev => {
                return Err(ExporterError::Rollback(self.core));
            }
            Some(prev) => {
                let gap = live - prev;
                if gap <= num_entries {
                    (slot_index(prev, num_entries), gap, 0)
                } else {
                    (
                        slot_index(live, num_entries),
                        num_entries,
                        gap - num_entries,
                    )
                }
            }
        };

        self.append(core_buf, start, count, num_entries)?;
        self.captured += count;
        self.lost += lost;
        self.last_seen = Some(live);

        if count == 0 {
            return Ok(PollOutcome::NoChange);
        }

        if self.first_tsc.is_none() {
            self.first_tsc = Some(read_entry_tsc(core_buf, start));
        }
        let shm_slot = slot_index(live, num_entries);
        let last_slot = if shm_slot == 0 {
            num_entries - 1
        } else {
            shm_slot - 1
        };
        self.last_tsc = read_entry_tsc(core_buf, last_slot);

        Ok(PollOutcome::Captured {
            appended: count,
            lost,
        })
    }

    fn append(
        &mut self,
        core_buf: &[u8],
        start: u64,
        count: u64,
        num_entries: u64,
    ) -> Result<(), ExporterError> {
        if count == 0 {
            return Ok(());
        }
        let bytes = read_wrapped_range(core_buf, start, count, num_entries);
        self.scratch
            .write_all(&bytes)
            .map_err(ExporterError::ScratchIo)
    }

    /// Stream this core's accumulated entries into `out`, 32 KiB at a
    /// time. Returns the number of bytes copied, for the aggregation
    /// step's byte-count verification against `captured() * ENTRY_SIZE`.
    pub fn drain_into(&mut self, out: &mut dyn Write) -> Result<u64, ExporterError> {
        self.scratch
            .seek(SeekFrom::Start(0))
            .map_err(ExporterError::ScratchIo)?;
        let mut buf = [0u8; 32 * 1024];
        let mut total = 0u64;
        loop {
            let n = self.scratch.read(&mut buf).map_err(ExporterError::ScratchIo)?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n]).map_err(ExporterError::ScratchIo)?;
            total += n as u64;
        }
        Ok(total)
    }

    /// Close and unlink this core's scratch file. Called once aggregation
    /// has drained it (spec.md §4.C aggregation step 6), and again on any
    /// fatal error to honor §7's "unlinks scratch files" cleanup — a
    /// missing file at that point is not a problem either way.
    pub fn remove_scratch(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("failed to remove scratch file {:?}: {}", self.path, e);
            }
        }
    }
}

fn read_entry_tsc(core_buf: &[u8], slot: u64) -> u64 {
    let off = HistoryLayout::entry_offset(slot) as usize;
    Entry::read_tsc_le(&core_buf[off..off + ENTRY_SIZE])
}

/// Work out what a core's first-ever poll can recover: if the ring hasn't
/// wrapped yet, everything from slot 0 up to `live` is intact. If it has,
/// only the most recent `num_entries` are still there; everything before
/// that was overwritten before we had a chance to see it.
fn first_capture(live: u64, num_entries: u64) -> (u64, u64, u64) {
    if live <= num_entries {
        (0, live, 0)
    } else {
        (slot_index(live, num_entries), num_entries, live - num_entries)
    }
}

/// Read `count` entries starting at circular slot `start`, handling the
/// wraparound back to slot 0 when `start + count` runs past
/// `num_entries`.
fn read_wrapped_range(core_buf: &[u8], start: u64, count: u64, num_entries: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity((count as usize) * ENTRY_SIZE);
    if count == 0 {
        return out;
    }
    let first_run = (num_entries - start).min(count);
    for slot in start..start + first_run {
        let off = HistoryLayout::entry_offset(slot) as usize;
        out.extend_from_slice(&core_buf[off..off + ENTRY_SIZE]);
    }
    for slot in 0..(count - first_run) {
        let off = HistoryLayout::entry_offset(slot) as usize;
        out.extend_from_slice(&core_buf[off..off + ENTRY_SIZE]);
    }
    out
}
