use tracing::{metadata::LevelFilter, *};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer};

use crate::cli;

// Start logger, should be done inside main
pub fn init() {
    // Redirect all logs from libs using "Log"
    LogTracer::init_with_filter(tracing::log::LevelFilter::Trace).expect("Failed to set logger");

    // Configure the console log
    let console_env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli::manager::is_verbose() {
            EnvFilter::new(LevelFilter::DEBUG.to_string())
        } else {
            EnvFilter::new(LevelFilter::INFO.to_string())
        }
    });

    let console_layer = fmt::Layer::new()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(fmt::format::FmtSpan::NONE)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_filter(filter_unwanted_crates(console_env_filter));

    // Configure the file log
    let file_env_filter = if cli::manager::is_tracing() {
        EnvFilter::new(LevelFilter::TRACE.to_string())
    } else {
        EnvFilter::new(LevelFilter::DEBUG.to_string())
    };
    let dir = cli::manager::log_path();
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::HOURLY)
        .filename_prefix(env!("CARGO_PKG_NAME"))
        .filename_suffix("log")
        .build(&dir);
    let (file_layer, file_error) = match file_appender {
        Ok(file_appender) => {
            let file_layer = fmt::Layer::new()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(fmt::format::FmtSpan::NONE)
                .with_target(false)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_filter(filter_unwanted_crates(file_env_filter));
            (Some(file_layer), None)
        }
        Err(error) => (None, Some(error)),
    };

    // Configure the default subscriber
    let subscriber = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)
        .expect("Unable to set a global subscriber");

    if let Some(error) = file_error {
        error!("Failed to create log files in {dir:?}, logging to console only: {error}");
    }

    info!(
        "{}, version: {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    );
    info!(
        "Starting at {}",
        chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
    );
    info!("Server running at {}", cli::manager::server_address());
    debug!("Command line call: {}", cli::manager::command_line_string());
    debug!(
        "Command line input struct call: {}",
        cli::manager::command_line()
    );
}

fn filter_unwanted_crates(env_filter: EnvFilter) -> EnvFilter {
    [
        // Connection level chatter from the web server
        "actix_server=warn",
        "actix_http=warn",
        "mio=off",
        // Every disk refresh is logged by sysinfo at debug level
        "sysinfo=warn",
    ]
    .into_iter()
    .fold(env_filter, |env_filter, directive| {
        env_filter.add_directive(directive.parse().expect("Invalid log directive"))
    })
}
