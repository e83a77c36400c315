pub mod service;
pub mod types;

pub use service::TelemetryService;
pub use types::{
    Query, ServiceError, ServiceState, TelemetryConfig, TelemetryStats, TelemetryStatus,
    TickOutcome,
};
