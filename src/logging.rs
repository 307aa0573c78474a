//! Process-wide diagnostic logging
//!
//! A [`Logger`] is built once at startup and handed to every component by
//! reference. Entries are plain text lines of the form
//! `timestamp - logger-name - LEVEL - message`, written to a size-rotated file
//! (5 MiB per file, 5 backups). Tests swap the file for an in-memory sink.

use crate::error::{AppError, Result};
use chrono::{DateTime, Local};
use file_rotate::{compression::Compression, suffix::AppendCount, ContentLimit, FileRotate};
use std::error::Error as StdError;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Size at which the active log file is rotated
pub const MAX_LOG_BYTES: usize = 5_242_880;

/// Number of rotated files kept next to the active one
pub const LOG_BACKUPS: usize = 5;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Debug level - detailed information for debugging
    Debug = 0,
    /// Info level - general application information
    Info = 1,
    /// Warning level - potentially harmful situations
    Warn = 2,
    /// Error level - error events but application can continue
    Error = 3,
}

impl LogLevel {
    /// Get log level name as written to the log file
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

/// A single log line before formatting
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Timestamp when log entry was created
    pub timestamp: DateTime<Local>,
    /// Log level
    pub level: LogLevel,
    /// Logger name/component
    pub logger: String,
    /// Log message
    pub message: String,
}

impl LogEntry {
    fn new(logger: &str, level: LogLevel, message: &str) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            logger: logger.to_string(),
            message: message.to_string(),
        }
    }

    /// Format as `timestamp - logger-name - LEVEL - message`
    pub fn format_line(&self) -> String {
        format!(
            "{} - {} - {} - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S,%3f"),
            self.logger,
            self.level.as_str(),
            self.message
        )
    }
}

type Sink = Box<dyn Write + Send>;

/// Logger writing formatted entries to a single sink
pub struct Logger {
    /// Logger name
    name: String,
    /// Minimum log level to output
    min_level: LogLevel,
    sink: Mutex<Sink>,
}

impl Logger {
    /// Create a logger over an arbitrary writer
    pub fn new<S: Into<String>>(name: S, sink: Sink) -> Self {
        Self {
            name: name.into(),
            min_level: LogLevel::Info,
            sink: Mutex::new(sink),
        }
    }

    /// Create a logger appending to `path`, rotated by size
    pub fn rotating_file<S: Into<String>>(name: S, path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::logging(format!("Cannot create log directory {}: {}", parent.display(), e))
            })?;
        }

        // FileRotate defers open errors until the first write
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| AppError::logging(format!("Cannot open log file {}: {}", path.display(), e)))?;

        let rotate = FileRotate::new(
            path,
            AppendCount::new(LOG_BACKUPS),
            ContentLimit::BytesSurpassed(MAX_LOG_BYTES),
            Compression::None,
            #[cfg(unix)]
            None,
        );

        Ok(Self::new(name, Box::new(rotate)))
    }

    /// Create a logger writing to standard error
    pub fn stderr<S: Into<String>>(name: S) -> Self {
        Self::new(name, Box::new(io::stderr()))
    }

    /// Create a logger whose output can be inspected through the returned sink
    pub fn in_memory<S: Into<String>>(name: S) -> (Self, MemorySink) {
        let sink = MemorySink::default();
        (Self::new(name, Box::new(sink.clone())), sink)
    }

    /// Set minimum log level
    pub fn set_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    /// Check if a log level would be output
    pub fn would_log(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    /// Write a message at the given level
    pub fn log(&self, level: LogLevel, message: &str) {
        if !self.would_log(level) {
            return;
        }
        self.write_entry(&LogEntry::new(&self.name, level, message));
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    /// Log an error entry followed by one "Caused by" line per error in the chain
    pub fn error_with_chain(&self, message: &str, error: &dyn StdError) {
        if !self.would_log(LogLevel::Error) {
            return;
        }

        let mut text = format!("{}\n  Error: {}", message, error);
        let mut source = error.source();
        while let Some(cause) = source {
            text.push_str(&format!("\n  Caused by: {}", cause));
            source = cause.source();
        }
        self.write_entry(&LogEntry::new(&self.name, LogLevel::Error, &text));
    }

    fn write_entry(&self, entry: &LogEntry) {
        let mut line = entry.format_line();
        line.push('\n');
        // one write per entry so rotation never splits a line
        if let Ok(mut sink) = self.sink.lock() {
            let _ = sink.write_all(line.as_bytes());
            let _ = sink.flush();
        }
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("min_level", &self.min_level)
            .finish()
    }
}

/// Shared in-memory buffer used as a log sink
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    /// Everything written so far
    pub fn contents(&self) -> String {
        self.buffer
            .lock()
            .map(|buffer| String::from_utf8_lossy(&buffer).into_owned())
            .unwrap_or_default()
    }

    /// Entry lines written so far
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    /// Lines containing ` - LEVEL - `
    pub fn lines_at(&self, level: LogLevel) -> Vec<String> {
        let marker = format!(" - {} - ", level.as_str());
        self.lines().into_iter().filter(|line| line.contains(&marker)).collect()
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log buffer poisoned"))?;
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
