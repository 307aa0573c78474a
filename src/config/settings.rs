//! Typed views over the loaded configuration

use super::Configuration;
use crate::error::{AppError, Result};
use std::time::Duration;

pub const MONGO_SECTION: &str = "MONGO";
pub const DSN_KEY: &str = "dsn";
pub const SPEEDTEST_SECTION: &str = "SPEEDTEST";

/// speedtest.net server list, nearest servers first
pub const DEFAULT_SERVER_LIST_URL: &str = "https://www.speedtest.net/api/js/servers?engine=js&limit=10";
/// speedtest.net client configuration document
pub const DEFAULT_CONFIG_URL: &str = "https://www.speedtest.net/speedtest-config.php";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CANDIDATES: usize = 5;
pub const DEFAULT_TEST_LENGTH_SECS: u64 = 10;

/// Document store connection settings
#[derive(Clone, PartialEq)]
pub struct MongoSettings {
    pub dsn: String,
}

impl MongoSettings {
    pub fn from_config(config: &Configuration) -> Result<Self> {
        let dsn = config.require(MONGO_SECTION, DSN_KEY)?.to_string();
        let settings = Self { dsn };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dsn.is_empty() {
            return Err(AppError::config("MongoDB DSN cannot be empty"));
        }
        if !(self.dsn.starts_with("mongodb://") || self.dsn.starts_with("mongodb+srv://")) {
            return Err(AppError::config(
                "MongoDB DSN must start with mongodb:// or mongodb+srv://",
            ));
        }
        Ok(())
    }
}

// the DSN usually embeds credentials
impl std::fmt::Debug for MongoSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoSettings").field("dsn", &"<redacted>").finish()
    }
}

/// Knobs for the speedtest.net provider
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedtestSettings {
    /// JSON server list endpoint
    pub server_list_url: String,
    /// XML document describing the client (address, ISP)
    pub config_url: String,
    /// Connect and read timeout
    pub timeout: Duration,
    /// Rewrite server URLs to https
    pub secure: bool,
    /// Nearest servers to ping when choosing the best one
    pub candidates: usize,
    /// Time budget per transfer direction
    pub test_length: Duration,
}

impl Default for SpeedtestSettings {
    fn default() -> Self {
        Self {
            server_list_url: DEFAULT_SERVER_LIST_URL.to_string(),
            config_url: DEFAULT_CONFIG_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            secure: false,
            candidates: DEFAULT_CANDIDATES,
            test_length: Duration::from_secs(DEFAULT_TEST_LENGTH_SECS),
        }
    }
}

impl SpeedtestSettings {
    /// Read `[SPEEDTEST]`, keeping defaults for anything absent
    pub fn from_config(config: &Configuration) -> Result<Self> {
        let mut settings = Self::default();
        if !config.has_section(SPEEDTEST_SECTION) {
            return Ok(settings);
        }

        if let Some(url) = config.get(SPEEDTEST_SECTION, "server_list_url") {
            settings.server_list_url = url.to_string();
        }
        if let Some(url) = config.get(SPEEDTEST_SECTION, "config_url") {
            settings.config_url = url.to_string();
        }
        if let Some(value) = config.get(SPEEDTEST_SECTION, "timeout") {
            settings.timeout = Duration::from_secs(parse_number(value, "timeout")?);
        }
        if let Some(value) = config.get(SPEEDTEST_SECTION, "secure") {
            settings.secure = parse_bool(value, "secure")?;
        }
        if let Some(value) = config.get(SPEEDTEST_SECTION, "candidates") {
            settings.candidates = parse_number(value, "candidates")? as usize;
        }
        if let Some(value) = config.get(SPEEDTEST_SECTION, "test_length") {
            settings.test_length = Duration::from_secs(parse_number(value, "test_length")?);
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings and return any errors
    pub fn validate(&self) -> Result<()> {
        validate_http_url(&self.server_list_url, "Server list URL")?;
        validate_http_url(&self.config_url, "Configuration URL")?;

        if self.timeout.is_zero() || self.timeout > Duration::from_secs(300) {
            return Err(AppError::config("Timeout must be between 1 and 300 seconds"));
        }
        if self.candidates == 0 || self.candidates > 20 {
            return Err(AppError::config("Candidates must be between 1 and 20"));
        }
        if self.test_length.is_zero() || self.test_length > Duration::from_secs(120) {
            return Err(AppError::config("Test length must be between 1 and 120 seconds"));
        }
        Ok(())
    }
}

fn validate_http_url(value: &str, what: &str) -> Result<()> {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        Ok(_) => Err(AppError::config(format!("{} must use http or https: {}", what, value))),
        Err(e) => Err(AppError::config(format!("Invalid {} '{}': {}", what.to_lowercase(), value, e))),
    }
}

fn parse_number(value: &str, key: &str) -> Result<u64> {
    value.trim().parse::<u64>().map_err(|e| {
        AppError::config(format!("Invalid value '{}' for {}.{}: {}", value, SPEEDTEST_SECTION, key, e))
    })
}

fn parse_bool(value: &str, key: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        _ => Err(AppError::config(format!(
            "Invalid boolean '{}' for {}.{}",
            value, SPEEDTEST_SECTION, key
        ))),
    }
}
