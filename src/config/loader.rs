//! Configuration file discovery

use super::Configuration;
use crate::error::{AppError, Result};
use crate::logging::Logger;
use std::path::{Path, PathBuf};

/// Preferred configuration file
pub const PROD_CONFIG_FILE: &str = "prod.conf";

/// Fallback configuration file
pub const DEFAULT_CONFIG_FILE: &str = "default.conf";

/// Locates and parses the active configuration file inside a working directory
pub struct ConfigLoader<'a> {
    work_dir: PathBuf,
    logger: &'a Logger,
}

impl<'a> ConfigLoader<'a> {
    pub fn new<P: Into<PathBuf>>(work_dir: P, logger: &'a Logger) -> Self {
        Self {
            work_dir: work_dir.into(),
            logger,
        }
    }

    /// Load `prod.conf` if present, otherwise `default.conf`
    pub fn load(&self) -> Result<Configuration> {
        if !self.work_dir.is_dir() {
            return Err(AppError::config(format!(
                "Working directory {} is not a readable directory",
                self.work_dir.display()
            )));
        }

        let prod_conf = self.work_dir.join(PROD_CONFIG_FILE);
        if prod_conf.is_file() {
            self.logger.warn(&format!(
                "Using production configuration file {}",
                prod_conf.display()
            ));
            return Configuration::from_file(&prod_conf);
        }

        let default_conf = self.work_dir.join(DEFAULT_CONFIG_FILE);
        if default_conf.is_file() {
            self.logger.warn(&format!(
                "Using default configuration file {}",
                default_conf.display()
            ));
            return Configuration::from_file(&default_conf);
        }

        Err(AppError::ConfigNotFound(default_conf))
    }
}

/// Convenience function to load the configuration for a working directory
pub fn load_configuration(work_dir: &Path, logger: &Logger) -> Result<Configuration> {
    ConfigLoader::new(work_dir, logger).load()
}
