//! Speedtest Recorder
//!
//! Measures download and upload throughput against the best available
//! speedtest.net server, times the measurement and records the result in a
//! MongoDB collection. One run produces at most one record; scheduling is left
//! to cron or a systemd timer.

pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod speedtest;
pub mod storage;

// Re-export commonly used types
pub use app::{App, Backends, LiveBackends, RunOutcome};
pub use config::Configuration;
pub use error::{AppError, Result, RunStage};
pub use logging::{LogLevel, Logger};
pub use models::{Measurement, SpeedTestRecord, TimedMeasurement};
pub use speedtest::{MeasurementProvider, SpeedTestRunner};
pub use storage::{DocumentStore, ResultPersister, WriteAck};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Build metadata embedded by build.rs
pub const BUILD_TIME: Option<&str> = option_env!("BUILD_TIME");
pub const GIT_COMMIT: Option<&str> = option_env!("GIT_COMMIT");

/// Name entries are logged under
pub const LOGGER_NAME: &str = "speedtest_recorder";

/// `v0.1.0 (abc1234, built 2024-01-01 00:00:00 UTC)`
pub fn version_line() -> String {
    match (GIT_COMMIT, BUILD_TIME) {
        (Some(commit), Some(built)) => format!("v{} ({}, built {})", VERSION, commit, built),
        (None, Some(built)) => format!("v{} (built {})", VERSION, built),
        _ => format!("v{}", VERSION),
    }
}
