use structopt::StructOpt;

/// Poll a ringtrace producer's shared-memory histories and converge them
/// into a single trace file.
///
/// The shared-memory object name is never taken literally on the command
/// line: it is built from the application name (`-s`) together with
/// either a numeric trace id (`-i`) or the producer's pid (`-p`), as
/// `/<name>_trace.<id>` or `/<name>_trace.pid<pid>`. Exactly one of
/// `-i`/`-p` must be given.
#[derive(Debug, StructOpt)]
#[structopt(name = "trace_record")]
pub struct Opt {
    /// Application name used to build the shm object name, e.g. `myapp`
    /// resolves to `/myapp_trace.<id>` or `/myapp_trace.pid<pid>`.
    #[structopt(short = "s", long = "name")]
    pub app_name: String,

    /// Numeric trace id; polls `/<name>_trace.<id>`.
    #[structopt(short = "i", long = "shm-id", conflicts_with = "pid")]
    pub shm_id: Option<u32>,

    /// Producer pid; polls `/<name>_trace.pid<pid>`.
    #[structopt(short = "p", long = "pid")]
    pub pid: Option<u32>,

    /// Output (aggregated) trace file path.
    #[structopt(short = "f", long = "file")]
    pub output: String,

    /// Disable verbose progress output; the final summary still prints
    /// unless the run ends in a fatal error.
    #[structopt(short = "q", long = "quiet")]
    pub quiet: bool,

    /// Poll interval, in milliseconds.
    #[structopt(long = "poll-interval-ms", default_value = "100")]
    pub poll_interval_ms: u64,
}

impl Opt {
    /// Resolve `-i`/`-p` (together with the required `-s` application
    /// name) into the shared-memory object name to poll. `structopt`'s
    /// `conflicts_with` has already ruled out both being set; this just
    /// rules out neither being set.
    pub fn resolve_shm_name(&self) -> Result<String, String> {
        match (self.shm_id, self.pid) {
            (Some(id), None) => Ok(format!("/{}_trace.{}", self.app_name, id)),
            (None, Some(pid)) => Ok(format!("/{}_trace.pid{}", self.app_name, pid)),
            (None, None) => Err("one of -i/--shm-id, -p/--pid is required".to_string()),
            (Some(_), Some(_)) => {
                unreachable!("structopt conflicts_with should have rejected this combination")
            }
        }
    }
}
