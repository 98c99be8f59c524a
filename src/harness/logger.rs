//! Per-script log capture.
//!
//! Each invocation gets its own [`ScriptLogger`]; anything the script (or code
//! it calls) logs through it lands in that script's result only. Entries are
//! also forwarded to `tracing` so they show up in the process log.

use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity of a captured line. `log` and `info` are the same level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "log" | "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: Level,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Join logging arguments the way a console does: text as-is, anything else
/// as compact JSON, separated by single spaces.
pub fn join_args(args: &[Value]) -> String {
    args.iter()
        .map(|arg| match arg {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug)]
pub struct ScriptLogger {
    script_id: usize,
    entries: Mutex<Vec<LogEntry>>,
}

impl ScriptLogger {
    pub fn new(script_id: usize) -> Self {
        Self {
            script_id,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn script_id(&self) -> usize {
        self.script_id
    }

    pub fn log(&self, level: Level, message: impl Into<String>) {
        self.record(LogEntry {
            level,
            timestamp: Utc::now(),
            message: message.into(),
        });
    }

    /// Keep an entry captured elsewhere, timestamp included.
    pub fn record(&self, entry: LogEntry) {
        match entry.level {
            Level::Info => tracing::info!(script_id = self.script_id, "{}", entry.message),
            Level::Warn => tracing::warn!(script_id = self.script_id, "{}", entry.message),
            Level::Error => tracing::error!(script_id = self.script_id, "{}", entry.message),
        }
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
    }

    /// Log several values as one line, see [`join_args`].
    pub fn log_args(&self, level: Level, args: &[Value]) {
        self.log(level, join_args(args));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Level::Error, message);
    }

    /// Snapshot of what has been captured so far.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_level_aliases() {
        assert_eq!(Level::parse("log"), Some(Level::Info));
        assert_eq!(Level::parse("INFO"), Some(Level::Info));
        assert_eq!(Level::parse("warning"), Some(Level::Warn));
        assert_eq!(Level::parse("error"), Some(Level::Error));
        assert_eq!(Level::parse("debug"), None);
    }

    #[test]
    fn test_join_args_serializes_non_text() {
        let line = join_args(&[json!("user"), json!({ "id": 7 }), json!(3.5), json!(null)]);
        assert_eq!(line, r#"user {"id":7} 3.5 null"#);
    }

    #[test]
    fn test_entries_keep_order_and_level() {
        let logger = ScriptLogger::new(1);
        logger.info("first");
        logger.warn("second");
        logger.log_args(Level::Error, &[json!("third"), json!([1, 2])]);

        let entries = logger.into_entries();
        let summary: Vec<_> = entries
            .iter()
            .map(|e| (e.level, e.message.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Level::Info, "first"),
                (Level::Warn, "second"),
                (Level::Error, "third [1,2]"),
            ]
        );
        assert!(entries[0].timestamp <= entries[2].timestamp);
    }
}
