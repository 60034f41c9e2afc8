use std::fmt;
use std::sync::{Mutex, PoisonError};

use tracing_subscriber::{fmt as fmt_layer, prelude::*, EnvFilter};

// ============================================================================
// Logging - leveled structured logger handed to every bus call
// ============================================================================
//
// Handlers and middleware log through the `Logger` carried by the call's
// Context. `TracingLogger` forwards to `tracing`; `RecordingLogger` keeps
// entries in memory for tests.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Leveled structured logger: a message plus key/value pairs
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, msg: &str, fields: &[(&str, String)]);

    fn debug(&self, msg: &str, fields: &[(&str, String)]) {
        self.log(LogLevel::Debug, msg, fields);
    }

    fn info(&self, msg: &str, fields: &[(&str, String)]) {
        self.log(LogLevel::Info, msg, fields);
    }

    fn warn(&self, msg: &str, fields: &[(&str, String)]) {
        self.log(LogLevel::Warn, msg, fields);
    }

    fn error(&self, msg: &str, fields: &[(&str, String)]) {
        self.log(LogLevel::Error, msg, fields);
    }

    /// Highest severity. Never terminates the process.
    fn fatal(&self, msg: &str, fields: &[(&str, String)]) {
        self.log(LogLevel::Fatal, msg, fields);
    }
}

/// Key/value pairs as one JSON object, keys sorted. A repeated key keeps its
/// last value.
fn render_fields(fields: &[(&str, String)]) -> String {
    let object: serde_json::Map<String, serde_json::Value> = fields
        .iter()
        .map(|(key, value)| (key.to_string(), serde_json::Value::String(value.clone())))
        .collect();
    serde_json::Value::Object(object).to_string()
}

/// Forwards to the `tracing` macros at the matching level
///
/// `tracing` field names are fixed at compile time, so the runtime pairs
/// travel as a single `fields` value holding a JSON object, next to the
/// message. JSON layers see it as a string to parse, not as nested fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, msg: &str, fields: &[(&str, String)]) {
        let fields = render_fields(fields);
        match level {
            LogLevel::Debug => tracing::debug!(fields = %fields, "{}", msg),
            LogLevel::Info => tracing::info!(fields = %fields, "{}", msg),
            LogLevel::Warn => tracing::warn!(fields = %fields, "{}", msg),
            LogLevel::Error => tracing::error!(fields = %fields, "{}", msg),
            LogLevel::Fatal => tracing::error!(fatal = true, fields = %fields, "{}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl LogEntry {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Keeps every entry in memory, in call order
#[derive(Debug, Default)]
pub struct RecordingLogger {
    entries: Mutex<Vec<LogEntry>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries logged so far
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn entries_at(&self, level: LogLevel) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.level == level)
            .collect()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, level: LogLevel, msg: &str, fields: &[(&str, String)]) {
        let entry = LogEntry {
            level,
            message: msg.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

/// Install the global tracing subscriber
///
/// Example filter: "info,cqrs_runtime=debug". Fails instead of panicking when
/// a subscriber is already installed.
pub fn init_tracing(filter: &str) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt_layer::layer().with_target(true).with_thread_ids(true))
        .with(EnvFilter::try_new(filter)?)
        .try_init()?;
    Ok(())
}
