//! Eligibility: which tasks run today, and which need their remote status
//! flipped afterwards.
//!
//! Every comparison is made at calendar-day granularity against a single
//! `now` snapshot supplied by the caller.

pub mod dates;
pub mod plan;

pub use self::plan::{plan, EligibleScript, Plan, Rejection};

use chrono::{DateTime, TimeZone};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::source::{Frequency, TaskRecord};

/// A task whose schedule data cannot be interpreted.
///
/// These are data errors: the task neither runs nor gets marked for a status
/// update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("daily task has no extra_data payload")]
    MissingPayload,

    #[error("extra_data is not a JSON object: {0}")]
    InvalidPayload(String),

    #[error("extra_data has no deadline_at field")]
    MissingDeadline,

    #[error("unparseable deadline_at: {0}")]
    InvalidDeadline(String),

    #[error("specific_date task has no date")]
    MissingDate,

    #[error("unparseable specific_date: {0:?}")]
    InvalidDate(String),
}

/// Outcome of evaluating one task against today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Eligibility {
    pub run_today: bool,
    pub needs_status_update: bool,
}

impl Eligibility {
    const RUN: Self = Self {
        run_today: true,
        needs_status_update: false,
    };
    const RUN_AND_CONSUME: Self = Self {
        run_today: true,
        needs_status_update: true,
    };
    const EXPIRED: Self = Self {
        run_today: false,
        needs_status_update: true,
    };
    const SKIP: Self = Self {
        run_today: false,
        needs_status_update: false,
    };
}

/// Decide whether `task` runs in the batch taken at `now`.
///
/// - `daily`: runs until the deadline day; on or after it the task is expired
///   and flagged for a status update instead.
/// - `specific_date`: runs (and is flagged as consumed) only on its day.
/// - anything else: always runs.
pub fn evaluate<Tz: TimeZone>(
    task: &TaskRecord,
    now: &DateTime<Tz>,
) -> Result<Eligibility, ScheduleError> {
    let today = now.date_naive();
    let tz = now.timezone();

    match task.frequency() {
        Frequency::Daily => {
            let deadline = deadline_value(task.extra_data.as_ref())?;
            let deadline_day = dates::calendar_day_of_value(&deadline, &tz)
                .ok_or_else(|| ScheduleError::InvalidDeadline(deadline.to_string()))?;
            if deadline_day <= today {
                Ok(Eligibility::EXPIRED)
            } else {
                Ok(Eligibility::RUN)
            }
        }
        Frequency::SpecificDate => {
            let raw = task
                .specific_date
                .as_deref()
                .ok_or(ScheduleError::MissingDate)?;
            let day = dates::calendar_day(raw, &tz)
                .ok_or_else(|| ScheduleError::InvalidDate(raw.to_string()))?;
            if day == today {
                Ok(Eligibility::RUN_AND_CONSUME)
            } else {
                Ok(Eligibility::SKIP)
            }
        }
        Frequency::Always => Ok(Eligibility::RUN),
    }
}

/// Pull `deadline_at` out of the auxiliary payload, which is normally a
/// JSON-encoded string.
fn deadline_value(extra: Option<&Value>) -> Result<Value, ScheduleError> {
    let payload = match extra {
        None | Some(Value::Null) => return Err(ScheduleError::MissingPayload),
        Some(Value::String(encoded)) => serde_json::from_str::<Value>(encoded)
            .map_err(|e| ScheduleError::InvalidPayload(e.to_string()))?,
        Some(other) => other.clone(),
    };

    match payload {
        Value::Object(mut map) => match map.remove("deadline_at") {
            None | Some(Value::Null) => Err(ScheduleError::MissingDeadline),
            Some(deadline) => Ok(deadline),
        },
        other => Err(ScheduleError::InvalidPayload(format!(
            "expected an object, got {}",
            other
        ))),
    }
}
