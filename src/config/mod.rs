//! Configuration management module

pub mod loader;
pub mod settings;

// Re-export main functionality
pub use loader::{load_configuration, ConfigLoader, DEFAULT_CONFIG_FILE, PROD_CONFIG_FILE};
pub use settings::{MongoSettings, SpeedtestSettings};

use crate::error::{AppError, Result};
use ini::{Ini, ParseOption};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Section whose values apply to every other section
pub const DEFAULT_SECTION: &str = "DEFAULT";

/// Section name to key/value settings, read once per run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configuration {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl Configuration {
    /// Parse INI text. Keys are case-insensitive, section names are not.
    pub fn parse_str(text: &str) -> Result<Self> {
        let options = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(text, options)?;

        let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for (section, properties) in ini.iter() {
            let Some(section) = section else {
                if let Some((key, _)) = properties.iter().next() {
                    return Err(AppError::config(format!(
                        "Key '{}' appears before any [section] header",
                        key
                    )));
                }
                continue;
            };

            let entries = sections.entry(section.to_string()).or_default();
            for (key, value) in properties.iter() {
                entries.insert(key.trim().to_lowercase(), value.trim().to_string());
            }
        }

        Ok(Self { sections })
    }

    /// Read and parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("Cannot read configuration file {}: {}", path.display(), e))
        })?;
        Self::parse_str(&text)
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    /// Look up a value, falling back to `[DEFAULT]` when the section exists but lacks the key
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        let key = key.to_lowercase();
        let values = self.sections.get(section)?;
        values
            .get(&key)
            .or_else(|| self.sections.get(DEFAULT_SECTION).and_then(|d| d.get(&key)))
            .map(String::as_str)
    }

    /// Look up a value that must be present
    pub fn require(&self, section: &str, key: &str) -> Result<&str> {
        if !self.has_section(section) {
            return Err(AppError::config(format!("Missing section [{}]", section)));
        }
        self.get(section, key).ok_or_else(|| {
            AppError::config(format!("Missing key '{}' in section [{}]", key, section))
        })
    }

    /// Database settings from `[MONGO]`
    pub fn mongo(&self) -> Result<MongoSettings> {
        MongoSettings::from_config(self)
    }

    /// Measurement settings from the optional `[SPEEDTEST]` section
    pub fn speedtest(&self) -> Result<SpeedtestSettings> {
        SpeedtestSettings::from_config(self)
    }
}
