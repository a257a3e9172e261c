//! Logging setup and the reporter capability handed to pipeline components.
//!
//! Components never reach for a process-wide logger. They take a
//! `&dyn Reporter`, which the binary backs with [`TracingReporter`] and tests
//! back with [`MemoryReporter`].

use std::cell::RefCell;

use tracing_subscriber::EnvFilter;

use crate::error::{AppError, EXIT_CONFIG};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
}

/// Sink for human-readable progress and diagnostic events.
pub trait Reporter {
    fn event(&self, level: Level, message: &str);

    fn debug(&self, message: &str) {
        self.event(Level::Debug, message);
    }

    fn info(&self, message: &str) {
        self.event(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.event(Level::Warn, message);
    }
}

/// Forwards events to `tracing`, tagged with the pipeline stage.
#[derive(Debug, Clone, Copy)]
pub struct TracingReporter {
    stage: &'static str,
}

impl TracingReporter {
    pub fn new(stage: &'static str) -> Self {
        Self { stage }
    }
}

impl Reporter for TracingReporter {
    fn event(&self, level: Level, message: &str) {
        match level {
            Level::Debug => tracing::debug!(stage = self.stage, "{message}"),
            Level::Info => tracing::info!(stage = self.stage, "{message}"),
            Level::Warn => tracing::warn!(stage = self.stage, "{message}"),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: RefCell<Vec<(Level, String)>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(Level, String)> {
        self.events.borrow().clone()
    }

    /// True if some event at `level` contains `needle`.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.events
            .borrow()
            .iter()
            .any(|(l, msg)| *l == level && msg.contains(needle))
    }
}

impl Reporter for MemoryReporter {
    fn event(&self, level: Level, message: &str) {
        self.events.borrow_mut().push((level, message.to_string()));
    }
}

/// Install the stderr `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_level` when set. Calling this more than once
/// is harmless; later calls keep the first subscriber.
pub fn init_tracing(default_level: &str) -> Result<(), AppError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level).map_err(|e| {
            AppError::new(EXIT_CONFIG, format!("Invalid log level '{default_level}': {e}"))
        })?,
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_reporter_records_levels() {
        let reporter = MemoryReporter::new();
        reporter.info("fetched CUUR0000SA0");
        reporter.warn("dropped duplicate");

        assert!(reporter.contains(Level::Info, "CUUR0000SA0"));
        assert!(reporter.contains(Level::Warn, "duplicate"));
        assert!(!reporter.contains(Level::Debug, "duplicate"));
        assert_eq!(reporter.events().len(), 2);
    }
}
