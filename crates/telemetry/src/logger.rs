//! The four-level structured logger sink.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, info, warn};

/// Severity of a structured log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured logger the engine cores write to. Payloads handed to a
/// logger are already sanitized; implementations just forward them.
pub trait TelemetryLogger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, data: Option<&Value>);

    fn debug(&self, message: &str, data: Option<&Value>) {
        self.log(LogLevel::Debug, message, data);
    }

    fn info(&self, message: &str, data: Option<&Value>) {
        self.log(LogLevel::Info, message, data);
    }

    fn warn(&self, message: &str, data: Option<&Value>) {
        self.log(LogLevel::Warn, message, data);
    }

    fn error(&self, message: &str, data: Option<&Value>) {
        self.log(LogLevel::Error, message, data);
    }
}

/// Default logger backed by the `tracing` macros.
#[derive(Debug, Default, Clone)]
pub struct TracingLogger;

impl TelemetryLogger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str, data: Option<&Value>) {
        let payload = data.map(|d| d.to_string()).unwrap_or_default();
        match level {
            LogLevel::Debug => debug!(data = %payload, "{message}"),
            LogLevel::Info => info!(data = %payload, "{message}"),
            LogLevel::Warn => warn!(data = %payload, "{message}"),
            LogLevel::Error => error!(data = %payload, "{message}"),
        }
    }
}

/// Logger that drops everything.
#[derive(Debug, Default, Clone)]
pub struct NullLogger;

impl TelemetryLogger for NullLogger {
    fn log(&self, _level: LogLevel, _message: &str, _data: Option<&Value>) {}
}

/// One captured log line.
#[derive(Debug, Clone)]
pub struct CapturedLog {
    pub level: LogLevel,
    pub message: String,
    pub data: Option<Value>,
}

/// In-memory logger for assertions in tests.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    lines: Mutex<Vec<CapturedLog>>,
}

impl MemoryLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<CapturedLog> {
        self.lines.lock().clone()
    }

    pub fn messages_at(&self, level: LogLevel) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|l| l.level == level)
            .map(|l| l.message.clone())
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|l| l.message.contains(needle))
    }
}

impl TelemetryLogger for MemoryLogger {
    fn log(&self, level: LogLevel, message: &str, data: Option<&Value>) {
        self.lines.lock().push(CapturedLog {
            level,
            message: message.to_string(),
            data: data.cloned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_logger_captures_by_level() {
        let logger = MemoryLogger::new();
        logger.info("resolved", None);
        logger.warn("missed", Some(&serde_json::json!({"key": "k"})));
        assert_eq!(logger.messages_at(LogLevel::Warn), vec!["missed"]);
        assert!(logger.contains("resolved"));
    }
}
