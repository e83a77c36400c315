use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::*;

use system_health_dashboard::{
    cli, logger,
    metrics::{Sampler, SysinfoSource},
    server,
    storage::{SampleLog, SegmentLogWriter, UnavailableLog},
    telemetry::TelemetryService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // CLI should be started before logger to allow control over verbosity
    cli::manager::init();
    // Logger should start before everything else to register any log information
    logger::manager::init();

    let config = cli::manager::telemetry_config();

    let source = Arc::new(SysinfoSource::new(&cli::manager::disk_mount_point()));
    let sampler = Sampler::new(source, config.source_timeout);

    let log: Box<dyn SampleLog> = match SegmentLogWriter::open(cli::manager::segment_log_config())
    {
        Ok(writer) => Box::new(writer),
        Err(error) => {
            error!("Samples will not be persisted, failed to open the sample log: {error}");
            Box::new(UnavailableLog::new(error.to_string()))
        }
    };

    let service = Arc::new(TelemetryService::new(
        sampler,
        log,
        config.history_capacity,
    ));
    service.start(config.period)?;

    let result = server::manager::run(&cli::manager::server_address(), service.clone()).await;

    service.stop().await;
    info!("Final telemetry status: {:?}", service.status());

    result.context("Web server failed")
}
