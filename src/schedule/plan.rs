//! Turn a fetched task list into the ordered batch for this run.

use chrono::{DateTime, TimeZone};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{evaluate, ScheduleError};
use crate::source::{TaskId, TaskRecord};

/// A script selected for this run, in source order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EligibleScript {
    pub task_id: TaskId,
    pub body: String,
}

/// A task whose schedule could not be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub task_id: TaskId,
    pub reason: String,
    #[serde(skip)]
    pub error: ScheduleError,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Plan {
    /// Number of records received from the source.
    pub fetched: usize,
    /// Records dropped for having no usable script text.
    pub dropped: usize,
    pub runnable: Vec<EligibleScript>,
    /// Tasks the task service should mark as done (expired or consumed).
    pub status_updates: Vec<TaskId>,
    pub rejected: Vec<Rejection>,
}

impl Plan {
    pub fn bodies(&self) -> Vec<&str> {
        self.runnable.iter().map(|s| s.body.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.runnable.is_empty()
    }
}

/// Evaluate every task against the same `now`.
///
/// Records without script text are dropped before their schedule is looked
/// at, so they never reach the status-update list either.
pub fn plan<Tz: TimeZone>(tasks: &[TaskRecord], now: &DateTime<Tz>) -> Plan {
    let mut plan = Plan {
        fetched: tasks.len(),
        ..Default::default()
    };

    for task in tasks {
        let Some(body) = task.script_body() else {
            debug!(task_id = %task.id, "Dropping task without script text");
            plan.dropped += 1;
            continue;
        };

        match evaluate(task, now) {
            Ok(decision) => {
                if decision.needs_status_update {
                    plan.status_updates.push(task.id.clone());
                }
                if decision.run_today {
                    plan.runnable.push(EligibleScript {
                        task_id: task.id.clone(),
                        body: body.to_string(),
                    });
                }
            }
            Err(error) => {
                warn!(task_id = %task.id, %error, "Rejecting task with invalid schedule");
                plan.rejected.push(Rejection {
                    task_id: task.id.clone(),
                    reason: error.to_string(),
                    error,
                });
            }
        }
    }

    info!(
        fetched = plan.fetched,
        runnable = plan.runnable.len(),
        dropped = plan.dropped,
        status_updates = plan.status_updates.len(),
        rejected = plan.rejected.len(),
        "Batch planned"
    );

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn task(id: i64, script: serde_json::Value, freq: Option<&str>) -> TaskRecord {
        TaskRecord {
            id: TaskId::Number(id.into()),
            script: Some(script),
            frequency_type: freq.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_plan_partitions_tasks() {
        let now = DateTime::parse_from_rfc3339("2024-01-02T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let mut expired = task(1, json!("echo expired"), Some("daily"));
        expired.extra_data = Some(json!(r#"{"deadline_at":"2024-01-01"}"#));

        let mut running = task(2, json!("echo running"), Some("daily"));
        running.extra_data = Some(json!(r#"{"deadline_at":"2024-03-01"}"#));

        let mut today = task(3, json!("echo today"), Some("specific_date"));
        today.specific_date = Some("2024-01-02".to_string());

        let mut later = task(4, json!("echo later"), Some("specific_date"));
        later.specific_date = Some("2024-01-09".to_string());

        let always = task(5, json!("echo always"), None);
        let empty = task(6, json!("  "), None);
        let not_text = task(7, json!({ "code": "x" }), None);

        let mut broken = task(8, json!("echo broken"), Some("daily"));
        broken.extra_data = Some(json!("oops"));

        // Empty script on an expired task: dropped before scheduling.
        let mut empty_expired = task(9, json!(""), Some("daily"));
        empty_expired.extra_data = Some(json!(r#"{"deadline_at":"2023-01-01"}"#));

        let tasks = vec![
            expired,
            running,
            today,
            later,
            always,
            empty,
            not_text,
            broken,
            empty_expired,
        ];
        let plan = plan(&tasks, &now);

        assert_eq!(plan.fetched, 9);
        assert_eq!(plan.dropped, 3);
        assert_eq!(
            plan.bodies(),
            vec!["echo running", "echo today", "echo always"]
        );
        assert_eq!(
            plan.status_updates,
            vec![TaskId::Number(1.into()), TaskId::Number(3.into())]
        );
        assert_eq!(plan.rejected.len(), 1);
        assert_eq!(plan.rejected[0].task_id, TaskId::Number(8.into()));
        assert!(matches!(
            plan.rejected[0].error,
            ScheduleError::InvalidPayload(_)
        ));
    }

    #[test]
    fn test_empty_input_plans_nothing() {
        let plan = plan(&[], &Utc::now());
        assert!(plan.is_empty());
        assert_eq!(plan.fetched, 0);
    }
}
