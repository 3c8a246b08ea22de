use std::process::ExitCode;

use structopt::StructOpt;

use ringtrace_record::{run, Opt, PollOutcome, ShutdownFlag};

fn main() -> ExitCode {
    env_logger::init();
    let opt = Opt::from_args();

    let shutdown = match ShutdownFlag::install() {
        Ok(flag) => flag,
        Err(e) => {
            eprintln!("signal setup: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let quiet = opt.quiet;
    let result = run(&opt, &shutdown, |core, outcome| {
        if quiet {
            return;
        }
        match outcome {
            PollOutcome::NoChange => {}
            PollOutcome::Captured { appended, lost } if lost == 0 => {
                println!("core {}: captured {} entries", core, appended);
            }
            PollOutcome::Captured { appended, lost } => {
                println!(
                    "core {}: captured {} entries, lost {} to overflow",
                    core, appended, lost
                );
            }
        }
    });

    match result {
        Ok(summary) => {
            if !quiet {
                for core in &summary.per_core {
                    if core.captured == 0 {
                        continue;
                    }
                    println!(
                        "core {}: {} entries captured, {} lost, {} us",
                        core.core, core.captured, core.lost, core.duration_us
                    );
                }
                println!(
                    "wrote {} bytes, {} entries captured, {} lost across {} core(s)",
                    summary.output_bytes,
                    summary.total_captured,
                    summary.total_lost,
                    summary.per_core.len()
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", error_kind(&e), e);
            ExitCode::FAILURE
        }
    }
}

fn error_kind(e: &ringtrace_record::ExporterError) -> &'static str {
    use ringtrace_record::ExporterError::*;
    match e {
        OpenInput(..) => "open",
        MapInput(..) => "mmap",
        InvalidSource(..) => "source",
        InvalidEntryCount(..) => "source",
        Rollback(..) => "rollback",
        ScratchFile(..) => "scratch",
        ScratchIo(..) => "scratch",
        OutputFile(..) => "output",
        OutputExists(..) => "output",
    }
}
