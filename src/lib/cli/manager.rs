use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use directories::ProjectDirs;

use crate::{
    history::DEFAULT_CAPACITY,
    metrics::sampler::DEFAULT_SOURCE_TIMEOUT,
    storage::{
        writer::{DEFAULT_MAX_SEGMENT_AGE, DEFAULT_MAX_SEGMENT_BYTES},
        SegmentLogConfig,
    },
    telemetry::{types::DEFAULT_PERIOD, TelemetryConfig},
};

#[derive(Parser, Debug)]
#[command(
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
struct Args {
    /// Sets the address for the REST API server
    #[arg(
        long,
        value_name = "<IP>:<PORT>",
        default_value = "0.0.0.0:8000",
        env = "SYSTEM_HEALTH_REST_SERVER"
    )]
    rest_server: String,

    /// Directory where the sample log segments are written [default: user data folder]
    #[arg(long, value_name = "PATH", env = "SYSTEM_HEALTH_DATA_PATH")]
    data_path: Option<PathBuf>,

    /// Directory where the service logs are written [default: user data folder]
    #[arg(long, value_name = "PATH", env = "SYSTEM_HEALTH_LOG_PATH")]
    log_path: Option<PathBuf>,

    /// Sampling period in milliseconds
    #[arg(
        long,
        value_name = "MS",
        default_value_t = DEFAULT_PERIOD.as_millis() as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    period_ms: u64,

    /// Number of recent samples kept in memory
    #[arg(
        long,
        value_name = "COUNT",
        default_value_t = DEFAULT_CAPACITY as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    history_capacity: u64,

    /// Size after which a log segment is closed and a new one is started
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_SEGMENT_BYTES)]
    segment_max_bytes: u64,

    /// Age after which a log segment is closed and a new one is started
    #[arg(long, value_name = "SECONDS", default_value_t = DEFAULT_MAX_SEGMENT_AGE.as_secs())]
    segment_max_age_secs: u64,

    /// Deletes the oldest closed segments beyond this count
    #[arg(long, value_name = "COUNT")]
    max_segments: Option<usize>,

    /// Time limit for a single reading of the operating system counters
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_SOURCE_TIMEOUT.as_millis() as u64)]
    source_timeout_ms: u64,

    /// Mount point whose disk usage is sampled
    #[arg(long, value_name = "PATH", default_value = "/")]
    disk_mount_point: PathBuf,

    /// Turns all log categories up to Debug, for more information check RUST_LOG env variable.
    #[arg(short, long)]
    verbose: bool,

    /// Turns all log categories up to Trace in the log file
    #[arg(long)]
    enable_tracing_level_log_file: bool,
}

#[derive(Debug)]
struct Manager {
    clap_matches: Args,
}

lazy_static! {
    static ref MANAGER: Arc<Manager> = Arc::new(Manager::new());
}

impl Manager {
    fn new() -> Self {
        Self {
            clap_matches: Args::parse(),
        }
    }
}

// Construct our manager, should be done inside main
pub fn init() {
    MANAGER.as_ref();
}

// Check if the verbosity parameter was used
pub fn is_verbose() -> bool {
    MANAGER.clap_matches.verbose
}

pub fn is_tracing() -> bool {
    MANAGER.clap_matches.enable_tracing_level_log_file
}

// Return the desired address for the REST API
pub fn server_address() -> String {
    MANAGER.clap_matches.rest_server.clone()
}

pub fn data_path() -> PathBuf {
    MANAGER
        .clap_matches
        .data_path
        .clone()
        .unwrap_or_else(|| default_path("metrics"))
}

pub fn log_path() -> PathBuf {
    MANAGER
        .clap_matches
        .log_path
        .clone()
        .unwrap_or_else(|| default_path("logs"))
}

pub fn disk_mount_point() -> PathBuf {
    MANAGER.clap_matches.disk_mount_point.clone()
}

pub fn telemetry_config() -> TelemetryConfig {
    telemetry_config_from(&MANAGER.clap_matches)
}

pub fn segment_log_config() -> SegmentLogConfig {
    segment_log_config_from(&MANAGER.clap_matches, data_path())
}

// Return the command line used to start this application
pub fn command_line_string() -> String {
    std::env::args().collect::<Vec<String>>().join(" ")
}

// Return a clone of current Args struct
pub fn command_line() -> String {
    format!("{:#?}", MANAGER.clap_matches)
}

fn default_path(folder: &str) -> PathBuf {
    match ProjectDirs::from("com", "System Health", env!("CARGO_PKG_NAME")) {
        Some(project) => project.data_dir().join(folder),
        None => PathBuf::from(".").join(folder),
    }
}

fn telemetry_config_from(args: &Args) -> TelemetryConfig {
    TelemetryConfig {
        period: Duration::from_millis(args.period_ms),
        history_capacity: args.history_capacity as usize,
        source_timeout: Duration::from_millis(args.source_timeout_ms),
    }
}

fn segment_log_config_from(args: &Args, directory: PathBuf) -> SegmentLogConfig {
    SegmentLogConfig {
        directory,
        max_segment_bytes: args.segment_max_bytes,
        max_segment_age: Duration::from_secs(args.segment_max_age_secs),
        max_segments: args.max_segments,
    }
}
