use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::attendance::{Attendance, AttendanceSession, StatusType};

/// Exception labels in the order they win the day, after the `absent` and
/// `excused` rules.
const EXCEPTION_PRIORITY: [StatusType; 3] = [
    StatusType::Late,
    StatusType::Undertime,
    StatusType::Overtime,
];

/// Folds every session of a day into one label.
///
/// Order: `absent` when every session is absent (or there are none),
/// then `excused` if any session is excused, then `late`, `undertime`,
/// `overtime` by presence in any session, else `present`.
///
/// Sessions that have not started carry no status, so a day where nothing
/// has started yet (or only some sessions are absent) reads `present`.
/// Callers that want elapsed sessions counted run the absent sweep first.
pub fn overall_status(sessions: &[AttendanceSession]) -> StatusType {
    if sessions
        .iter()
        .all(|s| s.status.contains(&StatusType::Absent))
    {
        return StatusType::Absent;
    }

    let has = |status: StatusType| sessions.iter().any(|s| s.status.contains(&status));

    if has(StatusType::Excused) {
        return StatusType::Excused;
    }

    EXCEPTION_PRIORITY
        .into_iter()
        .find(|status| has(*status))
        .unwrap_or(StatusType::Present)
}

/// Minutes worked across the day; sessions without both stamps add nothing.
pub fn total_work_minutes(sessions: &[AttendanceSession]) -> i64 {
    sessions.iter().map(AttendanceSession::worked_minutes).sum()
}

/// Totals for a run of day records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PeriodSummary {
    #[schema(example = 20)]
    pub days_recorded: u32,
    /// Planned days that elapsed without any record; counted as absent
    #[serde(default)]
    #[schema(example = 1)]
    pub days_missed: u32,
    #[schema(example = 9600)]
    pub total_work_minutes: i64,
    #[schema(example = 160.0)]
    pub total_work_hours: f64,
    #[schema(value_type = Object, example = json!({"present": 17, "late": 2, "absent": 1}))]
    pub days_by_status: BTreeMap<StatusType, u32>,
}

pub fn summarize_period(records: &[Attendance]) -> PeriodSummary {
    let mut summary = PeriodSummary::default();

    for record in records {
        summary.days_recorded += 1;
        summary.total_work_minutes += total_work_minutes(&record.sessions);
        *summary
            .days_by_status
            .entry(overall_status(&record.sessions))
            .or_insert(0) += 1;
    }

    summary.total_work_hours = summary.total_work_minutes as f64 / 60.0;
    summary
}

impl PeriodSummary {
    /// Folds in a planned day that passed without a record.
    pub fn add_missed_day(&mut self) {
        self.days_missed += 1;
        *self.days_by_status.entry(StatusType::Absent).or_insert(0) += 1;
    }
}
