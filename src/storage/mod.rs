//! Result persistence

pub mod mongo;

pub use mongo::{MongoStore, COLLECTION_NAME, DATABASE_NAME};

use crate::{
    error::Result,
    logging::Logger,
    models::{Measurement, SpeedTestRecord},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Whether the store confirmed a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAck {
    Acknowledged,
    Unacknowledged,
}

/// Destination for speed test records
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert one record as a single document
    async fn insert_record(&self, record: &SpeedTestRecord) -> Result<WriteAck>;
}

/// Writes the record for one run
pub struct ResultPersister<'a, S> {
    store: S,
    logger: &'a Logger,
}

impl<'a, S: DocumentStore> ResultPersister<'a, S> {
    pub fn new(store: S, logger: &'a Logger) -> Self {
        Self { store, logger }
    }

    /// Store `{test_time, execution_time, data}`. Store errors are returned as-is.
    pub async fn persist(
        &self,
        measurement: Measurement,
        execution_time: f64,
        test_time: DateTime<Utc>,
    ) -> Result<WriteAck> {
        self.logger.debug("Saving data to MongoDB");

        let record = SpeedTestRecord::new(measurement, execution_time, test_time);
        let ack = self.store.insert_record(&record).await?;

        match ack {
            WriteAck::Acknowledged => self.logger.info("Data saved to MongoDB"),
            WriteAck::Unacknowledged => self.logger.warn("Failed to save data to MongoDB"),
        }
        Ok(ack)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
