//! Measurement result and persisted record models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Throughput figures reported by a measurement provider
///
/// `download` and `upload` are in bits per second. Anything else the provider
/// reports (server identity, latency, byte counts) lives in `metadata` and is
/// serialized alongside the two figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub download: f64,
    pub upload: f64,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl Measurement {
    pub fn new(download: f64, upload: f64) -> Self {
        Self {
            download,
            upload,
            metadata: Map::new(),
        }
    }

    /// Attach a provider field
    pub fn with_metadata<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A measurement together with the wall-clock time it took
#[derive(Debug, Clone, PartialEq)]
pub struct TimedMeasurement {
    pub measurement: Measurement,
    pub elapsed: Duration,
}

impl TimedMeasurement {
    /// Elapsed time in seconds
    pub fn execution_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// The single document written per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedTestRecord {
    /// Run start
    pub test_time: DateTime<Utc>,
    /// Measurement duration in seconds
    pub execution_time: f64,
    pub data: Measurement,
}

impl SpeedTestRecord {
    pub fn new(data: Measurement, execution_time: f64, test_time: DateTime<Utc>) -> Self {
        Self {
            test_time,
            execution_time,
            data,
        }
    }
}
