//! Main application orchestration and execution

use crate::{
    config::{load_configuration, Configuration},
    error::{AppError, Result, RunStage},
    logging::Logger,
    speedtest::{MeasurementProvider, SpeedTestRunner, SpeedtestNetProvider},
    storage::{DocumentStore, MongoStore, ResultPersister, WriteAck},
};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    /// The record reached the store
    Completed(WriteAck),
    /// A stage failed; nothing after it ran
    Failed { stage: RunStage, error: AppError },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

/// Builds the measurement provider and the document store from configuration
#[async_trait]
pub trait Backends: Send + Sync {
    type Provider: MeasurementProvider;
    type Store: DocumentStore;

    fn provider(&self, config: &Configuration) -> Result<Self::Provider>;

    /// Called only once a measurement is available
    async fn store(&self, config: &Configuration) -> Result<Self::Store>;
}

#[async_trait]
impl<'b, B: Backends + 'b> Backends for &'b B {
    type Provider = B::Provider;
    type Store = B::Store;

    fn provider(&self, config: &Configuration) -> Result<Self::Provider> {
        (**self).provider(config)
    }

    async fn store(&self, config: &Configuration) -> Result<Self::Store> {
        (**self).store(config).await
    }
}

/// speedtest.net over HTTP, results into MongoDB
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveBackends;

#[async_trait]
impl Backends for LiveBackends {
    type Provider = SpeedtestNetProvider;
    type Store = MongoStore;

    fn provider(&self, config: &Configuration) -> Result<Self::Provider> {
        SpeedtestNetProvider::new(config.speedtest()?)
    }

    async fn store(&self, config: &Configuration) -> Result<Self::Store> {
        MongoStore::connect(&config.mongo()?).await
    }
}

/// Main application struct that coordinates all components
pub struct App<'a, B> {
    work_dir: PathBuf,
    logger: &'a Logger,
    backends: B,
}

impl<'a, B: Backends> App<'a, B> {
    pub fn new<P: Into<PathBuf>>(work_dir: P, logger: &'a Logger, backends: B) -> Self {
        Self {
            work_dir: work_dir.into(),
            logger,
            backends,
        }
    }

    /// Run load-config, measure and persist in order, stopping at the first failure
    pub async fn run(&self) -> RunOutcome {
        match self.execute().await {
            Ok(ack) => RunOutcome::Completed(ack),
            Err(error) => RunOutcome::Failed {
                stage: error.stage(),
                error,
            },
        }
    }

    async fn execute(&self) -> Result<WriteAck> {
        let config = load_configuration(&self.work_dir, self.logger)?;
        // DSN must be valid before measuring
        config.mongo()?;

        let test_time = Utc::now();
        let provider = self.backends.provider(&config)?;
        let timed = SpeedTestRunner::new(provider, self.logger).run().await?;
        let execution_time = timed.execution_seconds();

        let store = self.backends.store(&config).await?;
        ResultPersister::new(store, self.logger)
            .persist(timed.measurement, execution_time, test_time)
            .await
    }
}

/// Log a failed outcome at error level with its cause chain
pub fn log_outcome(logger: &Logger, outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed(_) => {}
        RunOutcome::Failed { stage, error } => {
            logger.error_with_chain(
                &format!("General error in {} stage [{}]", stage, error.category()),
                error,
            );
        }
    }
}

/// Directory and file stem of the running executable
pub fn program_location() -> (PathBuf, String) {
    let exe = std::env::current_exe().and_then(|path| path.canonicalize());
    match exe {
        Ok(path) => {
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| crate::PKG_NAME.to_string());
            (dir, name)
        }
        Err(_) => (
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            crate::PKG_NAME.to_string(),
        ),
    }
}
