//! Speed measurement: provider abstraction and the timed runner
//!
//! The runner owns the sequencing (best server, download, upload) and the
//! timing. Everything network-facing sits behind [`MeasurementProvider`] so
//! the runner can be driven by a stub in tests.

pub mod client_config;
pub mod provider;
pub mod servers;

pub use provider::{SpeedtestNetProvider, TransferPlan};
pub use servers::Server;

use crate::{
    error::Result,
    logging::Logger,
    models::{Measurement, TimedMeasurement},
};
use async_trait::async_trait;
use std::time::Instant;

/// Concurrent transfers per direction
pub const THREADS: usize = 2;

/// Source of throughput measurements
#[async_trait]
pub trait MeasurementProvider: Send {
    /// Pick the server the transfers will run against
    async fn select_best_server(&mut self) -> Result<()>;

    /// Measure download throughput in bits per second
    async fn download(&mut self, threads: usize) -> Result<f64>;

    /// Measure upload throughput in bits per second
    async fn upload(&mut self, threads: usize) -> Result<f64>;

    /// Everything measured so far
    fn results(&self) -> Measurement;
}

/// Runs one timed measurement cycle against a provider
pub struct SpeedTestRunner<'a, P> {
    provider: P,
    logger: &'a Logger,
}

impl<'a, P: MeasurementProvider> SpeedTestRunner<'a, P> {
    pub fn new(provider: P, logger: &'a Logger) -> Self {
        Self { provider, logger }
    }

    /// Select a server, measure both directions and time the whole sequence.
    ///
    /// Provider errors are returned as-is; nothing is retried.
    pub async fn run(&mut self) -> Result<TimedMeasurement> {
        self.logger.debug("About to execute speed test");
        let start = Instant::now();

        self.provider.select_best_server().await?;
        self.provider.download(THREADS).await?;
        self.provider.upload(THREADS).await?;

        let measurement = self.provider.results();
        self.logger.info(&format!(
            "Test result: Download: [{:.2}], Upload: [{:.2}]",
            measurement.download, measurement.upload
        ));

        Ok(TimedMeasurement {
            measurement,
            elapsed: start.elapsed(),
        })
    }

    pub fn into_provider(self) -> P {
        self.provider
    }
}
