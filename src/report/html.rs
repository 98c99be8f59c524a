//! HTML rendering of a [`Report`] via the `report.html` askama template.

use askama::Template;
use chrono::SecondsFormat;
use serde_json::Value;

use super::{Report, ReportError, Summary};
use crate::harness::{ExecutionResult, Level, LogEntry};

/// A rendered report, ready for the file sink and the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub subject: String,
    pub html: String,
}

struct LogView<'a> {
    css_class: &'static str,
    label: &'static str,
    timestamp: String,
    message: &'a str,
}

struct ScriptView<'a> {
    id: usize,
    success: bool,
    duration_ms: u64,
    output: String,
    has_error: bool,
    error_message: &'a str,
    error_trace: &'a str,
    logs: Vec<LogView<'a>>,
}

#[derive(Template)]
#[template(path = "report.html")]
struct ReportTemplate<'a> {
    title: &'a str,
    run_id: String,
    generated_at: String,
    summary: &'a Summary,
    scripts: Vec<ScriptView<'a>>,
}

/// Output as shown to a reader: text verbatim, structures as pretty JSON.
fn display_output(output: Option<&Value>) -> String {
    match output {
        None | Some(Value::Null) => "no output".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn log_view(entry: &LogEntry) -> LogView<'_> {
    let (css_class, label) = match entry.level {
        Level::Info => ("log-info", "INFO"),
        Level::Warn => ("log-warn", "WARN"),
        Level::Error => ("log-error", "ERROR"),
    };
    LogView {
        css_class,
        label,
        timestamp: entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        message: &entry.message,
    }
}

fn script_view(result: &ExecutionResult) -> ScriptView<'_> {
    let error = result.error.as_ref();
    ScriptView {
        id: result.id,
        success: result.success,
        duration_ms: result.duration_ms,
        output: display_output(result.output.as_ref()),
        has_error: !result.success,
        error_message: error.map(|e| e.message.as_str()).unwrap_or_default(),
        error_trace: error.map(|e| e.trace.as_str()).unwrap_or_default(),
        logs: result.logs.iter().map(log_view).collect(),
    }
}

pub fn subject_line(title: &str, summary: &Summary) -> String {
    format!(
        "{} ({}/{} succeeded)",
        title, summary.success_count, summary.total
    )
}

/// Render `report` as a self-contained HTML page.
pub fn render(report: &Report, title: &str) -> Result<Document, ReportError> {
    let template = ReportTemplate {
        title,
        run_id: report.run_id.to_string(),
        generated_at: report
            .generated_at
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        summary: &report.summary,
        scripts: report.results.iter().map(script_view).collect(),
    };

    Ok(Document {
        subject: subject_line(title, &report.summary),
        html: template.render()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fixtures::{result, with_log, with_output};
    use serde_json::json;

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn test_empty_report_renders() {
        let report = Report::new(Vec::new());
        let doc = render(&report, "Script execution report").unwrap();

        assert!(doc.html.contains(r#"<p class="count" id="total">0</p>"#));
        assert_eq!(count(&doc.html, r#"class="script-card""#), 0);
        assert!(doc.html.contains("No scripts ran"));
        assert_eq!(doc.subject, "Script execution report (0/0 succeeded)");
    }

    #[test]
    fn test_all_failed_report_renders() {
        let report = Report::new(vec![result(1, false, 2), result(2, false, 3)]);
        let doc = render(&report, "Nightly").unwrap();

        assert_eq!(count(&doc.html, r#"class="script-card""#), 2);
        assert_eq!(count(&doc.html, r#"class="error-details""#), 2);
        assert!(doc.html.contains("script 1 broke"));
        assert!(doc.html.contains("script 2 broke"));
        assert!(doc.html.contains(r#"<p class="count error" id="errors">2</p>"#));
        assert!(doc.html.contains(r#"<p class="count" id="duration">5ms</p>"#));
    }

    #[test]
    fn test_output_and_logs_are_rendered_in_order() {
        let ok = with_output(result(1, true, 4), json!({ "rows": 3 }));
        let ok = with_log(ok, Level::Info, "first line");
        let ok = with_log(ok, Level::Warn, "second line");
        let text = with_output(result(2, true, 1), json!("plain text"));
        let report = Report::new(vec![ok, text]);
        let doc = render(&report, "Nightly").unwrap();

        assert!(doc.html.contains("&quot;rows&quot;: 3"));
        assert!(doc.html.contains("plain text"));
        assert!(doc.html.contains("log-entry log-warn"));
        assert!(doc.html.contains("Logs (2)"));
        let first = doc.html.find("first line").unwrap();
        let second = doc.html.find("second line").unwrap();
        assert!(first < second);
        assert!(!doc.html.contains(r#"class="error-details""#));
    }

    #[test]
    fn test_script_text_is_escaped() {
        let noisy = with_log(result(1, true, 1), Level::Error, "<script>alert(1)</script>");
        let doc = render(&Report::new(vec![noisy]), "Nightly").unwrap();
        assert!(!doc.html.contains("<script>alert(1)</script>"));
        assert!(doc.html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_missing_output_placeholder() {
        assert_eq!(display_output(None), "no output");
        assert_eq!(display_output(Some(&Value::Null)), "no output");
        assert_eq!(display_output(Some(&json!(0))), "0");
    }
}
