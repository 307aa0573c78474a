//! Data models for measurements and persisted records

pub mod measurement;

pub use measurement::{Measurement, SpeedTestRecord, TimedMeasurement};
