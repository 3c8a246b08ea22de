//! Exercises the exporter against a real producer writing into real POSIX
//! shared memory, in-process: `ringtrace::Recorder` stands in for an
//! instrumented application, `ringtrace_record::run` stands in for the
//! `trace_record` binary.

use ringtrace::Recorder;
use ringtrace_record::{run, InputSource, Opt, ShutdownFlag};

fn unique_app_name(tag: &str) -> String {
    format!(
        "ringtrace-e2e-{}-{}-{}",
        tag,
        std::process::id(),
        std::ptr::addr_of!(tag) as usize
    )
}

fn opt(app_name: &str, shm_id: u32, output: &str) -> Opt {
    Opt {
        app_name: app_name.to_string(),
        shm_id: Some(shm_id),
        pid: None,
        output: output.to_string(),
        quiet: true,
        poll_interval_ms: 1,
    }
}

/// S1: a handful of events on one core, no overflow, converge cleanly.
#[test]
fn basic_single_core_capture() {
    let opt = opt(&unique_app_name("s1"), 0, "");
    let shm_name = opt.resolve_shm_name().unwrap();
    let recorder = Recorder::init(&shm_name, 64).unwrap().unwrap();
    for i in 0..10u64 {
        recorder.record(0, 0, 1, 0, 0, i, 0);
    }

    let out_dir = tempfile::tempdir().unwrap();
    let out_path = out_dir.path().join("trace.bin");
    let opt = Opt {
        output: out_path.to_str().unwrap().to_string(),
        ..opt
    };
    let shutdown = ShutdownFlag::new_unarmed();
    shutdown.trigger();

    let summary = run(&opt, &shutdown, |_, _| {}).unwrap();
    assert_eq!(summary.total_captured, 10);
    assert_eq!(summary.total_lost, 0);
    assert!(out_path.exists());

    recorder.cleanup();
}

/// S2: the producer writes past the ring's capacity before the exporter
/// ever polls; the overwritten prefix is reported lost, not silently
/// dropped from the totals.
#[test]
fn overflow_before_first_poll_is_reported_as_loss() {
    let opt = opt(&unique_app_name("s2"), 0, "");
    let shm_name = opt.resolve_shm_name().unwrap();
    let recorder = Recorder::init(&shm_name, 16).unwrap().unwrap();
    for i in 0..50u64 {
        recorder.record(0, 0, 1, 0, 0, i, 0);
    }

    let out_dir = tempfile::tempdir().unwrap();
    let out_path = out_dir.path().join("trace.bin");
    let opt = Opt {
        output: out_path.to_str().unwrap().to_string(),
        ..opt
    };
    let shutdown = ShutdownFlag::new_unarmed();
    shutdown.trigger();

    let summary = run(&opt, &shutdown, |_, _| {}).unwrap();
    assert_eq!(summary.total_captured, 16);
    assert_eq!(summary.total_lost, 34);

    recorder.cleanup();
}

/// S3: independent cores converge into disjoint regions of the same
/// output file, each with its own correct entry count and wall-time
/// bookkeeping.
#[test]
fn multiple_cores_converge_independently() {
    let opt = opt(&unique_app_name("s3"), 0, "");
    let shm_name = opt.resolve_shm_name().unwrap();
    let recorder = Recorder::init(&shm_name, 32).unwrap().unwrap();
    for core in 0..3u16 {
        for i in 0..(5 + core as u64) {
            recorder.record(core, 1_000_000 + i, core, 0, 0, i, 0);
        }
    }

    let out_dir = tempfile::tempdir().unwrap();
    let out_path = out_dir.path().join("trace.bin");
    let opt = Opt {
        output: out_path.to_str().unwrap().to_string(),
        ..opt
    };
    let shutdown = ShutdownFlag::new_unarmed();
    shutdown.trigger();

    let summary = run(&opt, &shutdown, |_, _| {}).unwrap();
    assert_eq!(summary.total_captured, 5 + 6 + 7);
    for core in 0..3usize {
        let found = summary.per_core.iter().find(|c| c.core == core).unwrap();
        assert_eq!(found.captured, 5 + core as u64);
        assert_eq!(found.lost, 0);
        assert!(found.last_tsc >= found.first_tsc);
    }

    recorder.cleanup();
}

/// Startup step 5: a previous run's output file (and its per-core
/// scratch companions) already sitting at the configured path is
/// unlinked automatically rather than refused.
#[test]
fn stale_output_and_scratch_companions_are_cleared_automatically() {
    let opt = opt(&unique_app_name("s5"), 0, "");
    let shm_name = opt.resolve_shm_name().unwrap();
    let recorder = Recorder::init(&shm_name, 16).unwrap().unwrap();
    recorder.record(0, 0, 1, 0, 0, 0, 0);

    let out_dir = tempfile::tempdir().unwrap();
    let out_path = out_dir.path().join("trace.bin");
    std::fs::write(&out_path, b"already here").unwrap();
    std::fs::write(format!("{}-0", out_path.to_str().unwrap()), b"stale scratch").unwrap();

    let opt = Opt {
        output: out_path.to_str().unwrap().to_string(),
        ..opt
    };
    let shutdown = ShutdownFlag::new_unarmed();
    shutdown.trigger();

    let summary = run(&opt, &shutdown, |_, _| {}).unwrap();
    assert_eq!(summary.total_captured, 1);

    recorder.cleanup();
}

/// An uninitialized region (no producer ever called `init`) is rejected
/// rather than silently producing an empty trace.
#[test]
fn rejects_an_uninitialized_source() {
    let shm_name = format!("/{}_trace.0", unique_app_name("uninit"));
    let err = InputSource::open(&shm_name);
    assert!(err.is_err());
}
