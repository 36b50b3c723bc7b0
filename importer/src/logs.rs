//! Leveled run log.
//!
//! Pipeline stages report progress through [`log_info`], [`log_success`],
//! [`log_warning`] and [`log_error`]. Entries go to stderr, either as
//! prefixed text or as one JSON object per line, and can additionally be
//! captured in memory.

use std::io::Write;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A single log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Nesting level for detail lines
    #[serde(default)]
    pub indent: u8,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Info, message: message.into(), indent: 0 }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Success, message: message.into(), indent: 0 }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Warning, message: message.into(), indent: 0 }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Error, message: message.into(), indent: 0 }
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }

    fn render_text(&self) -> String {
        let prefix = match self.level {
            LogLevel::Info => "   ",
            LogLevel::Success => "   ✓",
            LogLevel::Warning => "   ⚠️",
            LogLevel::Error => "   ❌",
        };
        let indent = "   ".repeat(self.indent as usize);
        format!("{}{} {}", indent, prefix, self.message)
    }
}

/// How entries are written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
    Silent,
}

struct SinkState {
    format: LogFormat,
    captured: Option<Vec<LogEntry>>,
}

/// Global log sink
pub static LOG_SINK: Lazy<LogSink> = Lazy::new(LogSink::new);

/// Writes entries to stderr and to an optional capture buffer.
pub struct LogSink {
    state: Mutex<SinkState>,
}

impl LogSink {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SinkState {
                format: LogFormat::Text,
                captured: None,
            }),
        }
    }

    pub fn set_format(&self, format: LogFormat) {
        if let Ok(mut state) = self.state.lock() {
            state.format = format;
        }
    }

    /// Start keeping a copy of every entry.
    pub fn start_capture(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.captured = Some(Vec::new());
        }
    }

    /// Stop capturing and return what was kept.
    pub fn take_captured(&self) -> Vec<LogEntry> {
        self.state
            .lock()
            .ok()
            .and_then(|mut state| state.captured.take())
            .unwrap_or_default()
    }

    pub fn log(&self, entry: LogEntry) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        let line = match state.format {
            LogFormat::Text => Some(entry.render_text()),
            LogFormat::Json => serde_json::to_string(&entry).ok(),
            LogFormat::Silent => None,
        };
        if let Some(line) = line {
            // A closed stderr must not abort an import.
            let _ = writeln!(std::io::stderr(), "{}", line);
        }

        if let Some(captured) = state.captured.as_mut() {
            captured.push(entry);
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

pub fn log_info(msg: impl Into<String>) {
    LOG_SINK.log(LogEntry::info(msg));
}

pub fn log_success(msg: impl Into<String>) {
    LOG_SINK.log(LogEntry::success(msg));
}

pub fn log_warning(msg: impl Into<String>) {
    LOG_SINK.log(LogEntry::warning(msg));
}

pub fn log_error(msg: impl Into<String>) {
    LOG_SINK.log(LogEntry::error(msg));
}

pub fn log_info_indent(msg: impl Into<String>, indent: u8) {
    LOG_SINK.log(LogEntry::info(msg).with_indent(indent));
}
