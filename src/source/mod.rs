//! Task sources: the raw task records a batch is planned from.
//!
//! A source returns records exactly as the task service stores them. No
//! scheduling decision is made here; see [`crate::schedule`].

pub mod file;
pub mod http;

pub use self::file::FileTaskSource;
pub use self::http::HttpTaskSource;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("task source returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to read task file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("task list is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("task source did not return a list of tasks")]
    NotAList,
}

/// Trait for anything that can hand over the current task list.
#[async_trait::async_trait]
pub trait TaskSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<TaskRecord>, SourceError>;
}

/// Task identifier as issued by the task service (numeric or textual).
///
/// Any JSON number is kept as-is, so float or out-of-range ids still
/// identify their record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskId {
    Number(serde_json::Number),
    Text(String),
}

impl Default for TaskId {
    fn default() -> Self {
        TaskId::Text(String::new())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskId::Number(n) => write!(f, "{}", n),
            TaskId::Text(s) if s.is_empty() => write!(f, "<unnamed>"),
            TaskId::Text(s) => write!(f, "{}", s),
        }
    }
}

/// How often a task wants to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    /// Runs every day until its deadline day arrives.
    Daily,
    /// Runs once, on one calendar day.
    SpecificDate,
    /// Anything else: runs every time.
    Always,
}

impl Frequency {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("daily") => Frequency::Daily,
            Some("specific_date") => Frequency::SpecificDate,
            _ => Frequency::Always,
        }
    }
}

/// One schedulable unit from the task service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(default)]
    pub id: TaskId,
    /// Kept loosely typed: a non-text script is an input error, not a
    /// deserialization failure of the whole list.
    #[serde(default)]
    pub script: Option<Value>,
    #[serde(default)]
    pub frequency_type: Option<String>,
    /// Auxiliary payload. The service sends it as a JSON-encoded string, but
    /// inline objects are accepted too.
    #[serde(default)]
    pub extra_data: Option<Value>,
    #[serde(default)]
    pub specific_date: Option<String>,
}

impl TaskRecord {
    pub fn frequency(&self) -> Frequency {
        Frequency::parse(self.frequency_type.as_deref())
    }

    /// The script text, if it is a string with non-whitespace content.
    pub fn script_body(&self) -> Option<&str> {
        match &self.script {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Decode a task list response.
///
/// Accepts either a bare array or an object wrapping the array in `result`.
/// Records that fail to decode individually are skipped with a warning.
pub fn parse_task_list(body: Value) -> Result<Vec<TaskRecord>, SourceError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("result") {
            Some(Value::Array(items)) => items,
            _ => return Err(SourceError::NotAList),
        },
        _ => return Err(SourceError::NotAList),
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<TaskRecord>(item) {
            Ok(record) => records.push(record),
            Err(e) => warn!(index, error = %e, "Skipping malformed task record"),
        }
    }
    Ok(records)
}
