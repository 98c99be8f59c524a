//! scriptbatch -- daily batch runner for remotely scheduled scripts.
//!
//! This crate fetches a task list, decides which scripts are due today, runs
//! them one after another against a shared context, and publishes an HTML
//! report to disk and to a mail relay.

pub mod config;
pub mod harness;
pub mod notify;
pub mod report;
pub mod schedule;
pub mod source;

use anyhow::{Context as _, Result};
use chrono::{DateTime, TimeZone};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::ScriptBatchConfig;
use crate::harness::{Harness, ScriptEngine};
use crate::notify::Notifier;
use crate::report::Report;
use crate::schedule::Plan;
use crate::source::TaskSource;

/// What one run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub plan: Plan,
    /// `None` when nothing was due.
    pub report: Option<Report>,
    /// Pending notification, if one was dispatched.
    pub notification: Option<JoinHandle<()>>,
}

/// Execute `scripts` as one batch and aggregate the results.
pub async fn execute<E, S>(engine: E, scripts: &[S], config: &ScriptBatchConfig) -> Result<Report>
where
    E: ScriptEngine,
    S: AsRef<str>,
{
    let batch = Harness::new(engine)
        .with_timeout(config.execution.script_timeout())
        .run_batch(scripts)
        .await
        .context("batch aborted")?;

    let report = Report::new(batch.results);
    info!(
        run_id = %report.run_id,
        total = report.summary.total,
        succeeded = report.summary.success_count,
        failed = report.summary.error_count,
        duration_ms = report.summary.total_duration_ms,
        "Batch complete"
    );
    Ok(report)
}

/// Render and persist `report`, then hand it to the notifier.
///
/// A write failure is fatal; the notification is not awaited.
pub fn publish(
    report: &Report,
    config: &ScriptBatchConfig,
    notifier: Option<&Notifier>,
) -> Result<Option<JoinHandle<()>>> {
    let document = report::render(report, &config.report.title).context("failed to render report")?;

    report::persist(&config.report.path, &document).context("failed to persist report")?;
    if let Some(json_path) = &config.report.json_path {
        report::persist_json(json_path, report).context("failed to persist JSON report")?;
    }

    Ok(notifier.map(|n| n.dispatch(document)))
}

/// One full cycle: fetch, plan against `now`, execute, publish.
pub async fn run_once<E, Tz>(
    source: &dyn TaskSource,
    engine: E,
    now: &DateTime<Tz>,
    config: &ScriptBatchConfig,
    notifier: Option<&Notifier>,
) -> Result<RunOutcome>
where
    E: ScriptEngine,
    Tz: TimeZone,
{
    let tasks = source.fetch().await.context("failed to fetch task list")?;
    let plan = schedule::plan(&tasks, now);

    if !plan.status_updates.is_empty() {
        let ids: Vec<String> = plan.status_updates.iter().map(|id| id.to_string()).collect();
        info!(tasks = ?ids, "Tasks due for a status update");
    }

    if plan.is_empty() {
        info!("No runnable scripts, nothing to do");
        return Ok(RunOutcome {
            plan,
            report: None,
            notification: None,
        });
    }

    let report = execute(engine, &plan.bodies(), config).await?;
    let notification = publish(&report, config, notifier)?;

    Ok(RunOutcome {
        plan,
        report: Some(report),
        notification,
    })
}
