//! Batch report: summary counters, the frozen results, and the sinks that
//! persist them.

pub mod html;

pub use self::html::{render, Document};

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::harness::ExecutionResult;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to render report: {0}")]
    Render(#[from] askama::Error),

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write report to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub total_duration_ms: u64,
}

/// Counters over a result sequence. Well-defined for any input, empty included.
pub fn summarize(results: &[ExecutionResult]) -> Summary {
    let total = results.len();
    let success_count = results.iter().filter(|r| r.success).count();
    let total_duration_ms = results
        .iter()
        .fold(0u64, |sum, r| sum.saturating_add(r.duration_ms));

    Summary {
        total,
        success_count,
        error_count: total - success_count,
        total_duration_ms,
    }
}

/// The aggregate of one batch. Built once, after the last script finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub summary: Summary,
    pub results: Vec<ExecutionResult>,
}

impl Report {
    pub fn new(results: Vec<ExecutionResult>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            summary: summarize(&results),
            results,
        }
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), ReportError> {
    let write_error = |source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_error)?;
    }
    std::fs::write(path, content).map_err(write_error)
}

/// Write the rendered document to `path`, creating parent directories.
pub fn persist(path: &Path, document: &Document) -> Result<(), ReportError> {
    write_file(path, &document.html)?;
    info!(path = %path.display(), bytes = document.html.len(), "Report written");
    Ok(())
}

/// Write the report as pretty JSON.
pub fn persist_json(path: &Path, report: &Report) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(report)?;
    write_file(path, &json)?;
    info!(path = %path.display(), "JSON report written");
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::harness::{Level, LogEntry, ScriptFailure};
    use serde_json::Value;

    pub fn result(id: usize, success: bool, duration_ms: u64) -> ExecutionResult {
        ExecutionResult {
            id,
            success,
            output: None,
            error: (!success).then(|| ScriptFailure::new(format!("script {} broke", id))),
            started_at: Utc::now(),
            duration_ms,
            logs: Vec::new(),
        }
    }

    pub fn with_output(mut result: ExecutionResult, output: Value) -> ExecutionResult {
        result.output = Some(output);
        result
    }

    pub fn with_log(mut result: ExecutionResult, level: Level, message: &str) -> ExecutionResult {
        result.logs.push(LogEntry {
            level,
            timestamp: Utc::now(),
            message: message.to_string(),
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::result;
    use super::*;

    #[test]
    fn test_summarize_mixed() {
        let summary = summarize(&[result(1, true, 10), result(2, false, 5)]);
        assert_eq!(
            summary,
            Summary {
                total: 2,
                success_count: 1,
                error_count: 1,
                total_duration_ms: 15,
            }
        );
    }

    #[test]
    fn test_summarize_empty() {
        assert_eq!(summarize(&[]), Summary::default());
    }

    #[test]
    fn test_report_carries_summary() {
        let report = Report::new(vec![result(1, false, 3), result(2, false, 4)]);
        assert_eq!(report.summary.error_count, 2);
        assert_eq!(report.summary.total_duration_ms, 7);
        assert_eq!(report.results.len(), 2);
    }

    #[test]
    fn test_persist_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out").join("report.html");
        let document = Document {
            subject: "s".to_string(),
            html: "<p>hi</p>".to_string(),
        };
        persist(&path, &document).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<p>hi</p>");
    }

    #[test]
    fn test_persist_json_round_trips_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = Report::new(vec![result(1, true, 8)]);
        persist_json(&path, &report).unwrap();

        let loaded: Report =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.summary, report.summary);
        assert_eq!(loaded.run_id, report.run_id);
    }

    #[test]
    fn test_persist_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be overwritten with a file.
        let document = Document {
            subject: String::new(),
            html: String::new(),
        };
        let err = persist(dir.path(), &document).unwrap_err();
        assert!(matches!(err, ReportError::Write { .. }));
    }
}
