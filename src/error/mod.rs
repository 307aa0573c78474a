//! Error handling for the speedtest recorder

use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Custom error types for the speedtest recorder
#[derive(Error, Debug)]
pub enum AppError {
    /// Neither configuration candidate exists
    #[error("Configuration not found: default configuration file {} not found", .0.display())]
    ConfigNotFound(PathBuf),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Speed measurement (provider or network) errors
    #[error("Measurement error: {0}")]
    Measurement(String),

    /// Document store errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Log sink errors
    #[error("Logging error: {0}")]
    Logging(String),
}

/// Stage of a run an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Configuration,
    Measurement,
    Persistence,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Configuration => "configuration",
            RunStage::Measurement => "measurement",
            RunStage::Persistence => "persistence",
        };
        f.write_str(name)
    }
}

impl AppError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new measurement error
    pub fn measurement<S: Into<String>>(message: S) -> Self {
        Self::Measurement(message.into())
    }

    /// Create a new persistence error
    pub fn persistence<S: Into<String>>(message: S) -> Self {
        Self::Persistence(message.into())
    }

    /// Create a new logging error
    pub fn logging<S: Into<String>>(message: S) -> Self {
        Self::Logging(message.into())
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::ConfigNotFound(_) | Self::Config(_) => "CONFIG",
            Self::Measurement(_) => "MEASUREMENT",
            Self::Persistence(_) => "PERSISTENCE",
            Self::Logging(_) => "LOGGING",
        }
    }

    /// Stage of the run this error aborts
    pub fn stage(&self) -> RunStage {
        match self {
            // logging is set up alongside configuration, before any measurement
            Self::ConfigNotFound(_) | Self::Config(_) | Self::Logging(_) => RunStage::Configuration,
            Self::Measurement(_) => RunStage::Measurement,
            Self::Persistence(_) => RunStage::Persistence,
        }
    }
}

/// Render an error followed by every `source()` in its chain, separated by ": "
pub fn describe_chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}

impl From<ini::ParseError> for AppError {
    fn from(error: ini::ParseError) -> Self {
        Self::config(format!("Failed to parse configuration file: {}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::measurement(format!("Request timed out: {}", describe_chain(&error)))
        } else if error.is_connect() {
            Self::measurement(format!("Connection failed: {}", describe_chain(&error)))
        } else {
            Self::measurement(describe_chain(&error))
        }
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(error: mongodb::error::Error) -> Self {
        Self::persistence(describe_chain(&error))
    }
}

impl From<mongodb::bson::ser::Error> for AppError {
    fn from(error: mongodb::bson::ser::Error) -> Self {
        Self::persistence(format!("Failed to encode document: {}", describe_chain(&error)))
    }
}

/// Custom Result type for the application
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Outer(Inner);

    #[derive(Debug)]
    struct Inner;

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "insert failed")
        }
    }

    impl fmt::Display for Inner {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "connection reset")
        }
    }

    impl StdError for Outer {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    impl StdError for Inner {}

    #[test]
    fn test_error_creation() {
        let config_error = AppError::config("Missing DSN");
        assert_eq!(config_error.category(), "CONFIG");
        assert_eq!(config_error.stage(), RunStage::Configuration);

        let measurement_error = AppError::measurement("no server");
        assert_eq!(measurement_error.category(), "MEASUREMENT");
        assert_eq!(measurement_error.stage(), RunStage::Measurement);

        let persistence_error = AppError::persistence("refused");
        assert_eq!(persistence_error.category(), "PERSISTENCE");
        assert_eq!(persistence_error.stage(), RunStage::Persistence);

        assert_eq!(AppError::logging("disk full").stage(), RunStage::Configuration);
    }

    #[test]
    fn test_config_not_found_display() {
        let error = AppError::ConfigNotFound(PathBuf::from("/opt/speedtest/default.conf"));
        let display = error.to_string();
        assert!(display.contains("Configuration not found"));
        assert!(display.contains("/opt/speedtest/default.conf"));
        assert_eq!(error.category(), "CONFIG");
    }

    #[test]
    fn test_describe_chain_includes_sources() {
        let error = Outer(Inner);
        assert_eq!(describe_chain(&error), "insert failed: connection reset");
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(RunStage::Configuration.to_string(), "configuration");
        assert_eq!(RunStage::Measurement.to_string(), "measurement");
        assert_eq!(RunStage::Persistence.to_string(), "persistence");
    }
}
