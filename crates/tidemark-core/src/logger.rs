use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// Tag attached to every record the engine emits.
pub const LOG_TAG: &str = "Migrations";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Debug => "debug",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub tag: &'static str,
}

/// Destination for engine log records, for hosts that route logs themselves.
pub trait LogSink: Send + Sync {
    fn log(&self, record: LogRecord);
}

impl<F> LogSink for F
where
    F: Fn(LogRecord) + Send + Sync,
{
    fn log(&self, record: LogRecord) {
        self(record)
    }
}

/// Leveled logger used by the engine. Forwards to the installed sink, or to
/// `tracing` when there is none.
#[derive(Clone)]
pub struct Logger {
    enabled: bool,
    sink: Option<Arc<dyn LogSink>>,
}

impl Default for Logger {
    fn default() -> Self {
        Self {
            enabled: true,
            sink: None,
        }
    }
}

impl Logger {
    pub fn new(enabled: bool, sink: Option<Arc<dyn LogSink>>) -> Self {
        Self { enabled, sink }
    }

    pub fn disabled() -> Self {
        Self::new(false, None)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        if !self.enabled {
            return;
        }
        let message = message.into();
        match &self.sink {
            Some(sink) => sink.log(LogRecord {
                level,
                message,
                tag: LOG_TAG,
            }),
            None => match level {
                LogLevel::Info => tracing::info!("{LOG_TAG}: {message}"),
                LogLevel::Warn => tracing::warn!("{LOG_TAG}: {message}"),
                LogLevel::Error => tracing::error!("{LOG_TAG}: {message}"),
                LogLevel::Debug => tracing::debug!("{LOG_TAG}: {message}"),
            },
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("enabled", &self.enabled)
            .field("custom_sink", &self.sink.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn capture() -> (Logger, Arc<Mutex<Vec<LogRecord>>>) {
        let records = Arc::new(Mutex::new(Vec::new()));
        let sink_records = Arc::clone(&records);
        let sink: Arc<dyn LogSink> =
            Arc::new(move |record: LogRecord| sink_records.lock().unwrap().push(record));
        (Logger::new(true, Some(sink)), records)
    }

    #[test]
    fn sink_receives_tagged_records() {
        let (logger, records) = capture();
        logger.info("Finished migrating.");
        logger.warn("careful");

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, LogLevel::Info);
        assert_eq!(records[0].tag, "Migrations");
        assert_eq!(records[0].message, "Finished migrating.");
        assert_eq!(records[1].level, LogLevel::Warn);
    }

    #[test]
    fn disabled_logger_drops_everything() {
        let records = Arc::new(Mutex::new(Vec::new()));
        let sink_records = Arc::clone(&records);
        let sink: Arc<dyn LogSink> =
            Arc::new(move |record: LogRecord| sink_records.lock().unwrap().push(record));
        let logger = Logger::new(false, Some(sink));

        logger.error("ignored");
        assert!(records.lock().unwrap().is_empty());
    }

    #[test]
    fn level_serializes_lowercase() {
        let json = serde_json::to_string(&LogLevel::Debug).unwrap();
        assert_eq!(json, "\"debug\"");
    }
}
