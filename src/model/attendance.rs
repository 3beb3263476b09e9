use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::engine::day_aggregator::{overall_status, total_work_minutes};
use crate::engine::geofence::GeoPoint;
use crate::model::schedule::{PlannedSession, Scheduler};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StatusType {
    Present,
    Absent,
    Late,
    Excused,
    Undertime,
    Overtime,
}

/// Who last marked the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MarkedBy {
    #[serde(rename = "self")]
    #[strum(serialize = "self")]
    Own,
    Admin,
    Agency,
}

/// Lifecycle of a single observed session, derived from its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    ClockedIn,
    Completed,
    Excused,
    Absent,
}

/// Append-only audit note attached to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Remark {
    #[schema(example = "2026-01-05T18:30:00", format = "date-time", value_type = String)]
    pub at: NaiveDateTime,
    pub by: MarkedBy,
    #[schema(example = "Excused: medical appointment (was: absent)")]
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceSession {
    pub id: String,
    pub schedule: PlannedSession,
    #[schema(example = "2026-01-05T08:58:00", format = "date-time", value_type = Option<String>)]
    pub check_in: Option<NaiveDateTime>,
    #[schema(example = "2026-01-05T17:02:00", format = "date-time", value_type = Option<String>)]
    pub check_out: Option<NaiveDateTime>,
    pub geo_location: Option<GeoPoint>,
    pub photo_start_url: Option<String>,
    pub photo_end_url: Option<String>,
    #[serde(default)]
    #[schema(value_type = Vec<StatusType>)]
    pub status: BTreeSet<StatusType>,
    #[serde(default)]
    pub remarks: Vec<Remark>,
}

impl AttendanceSession {
    pub fn planned(schedule: PlannedSession) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            schedule,
            check_in: None,
            check_out: None,
            geo_location: None,
            photo_start_url: None,
            photo_end_url: None,
            status: BTreeSet::new(),
            remarks: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        if self.status.contains(&StatusType::Excused) {
            SessionState::Excused
        } else if self.status.contains(&StatusType::Absent) {
            SessionState::Absent
        } else if self.check_out.is_some() {
            SessionState::Completed
        } else if self.check_in.is_some() {
            SessionState::ClockedIn
        } else {
            SessionState::NotStarted
        }
    }

    /// Most recent clock event recorded on this session.
    pub fn last_event(&self) -> Option<NaiveDateTime> {
        self.check_out.or(self.check_in)
    }

    /// Minutes between check-in and check-out; 0 unless both are present.
    pub fn worked_minutes(&self) -> i64 {
        match (self.check_in, self.check_out) {
            (Some(check_in), Some(check_out)) => (check_out - check_in).num_minutes().max(0),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScheduleRef {
    pub id: String,
    #[schema(example = "BSIT Practicum 2026")]
    pub name: String,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserRef {
    #[schema(example = 1001)]
    pub id: u64,
    #[schema(example = "juan.delacruz")]
    pub name: String,
}

/// One user's attendance for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Attendance {
    pub id: String,
    pub schedule: ScheduleRef,
    pub user: UserRef,
    pub sessions: Vec<AttendanceSession>,
    pub overall_status: StatusType,
    pub marked_by: MarkedBy,
    #[schema(example = 480)]
    pub total_work_minutes: i64,
    #[schema(example = "2026-01-05T08:58:00", format = "date-time", value_type = String)]
    pub created_at: NaiveDateTime,
    #[schema(example = "2026-01-05T17:02:00", format = "date-time", value_type = String)]
    pub updated_at: NaiveDateTime,
}

impl Attendance {
    /// Day record holding one not-started session per planned session.
    pub fn placeholder(
        scheduler: &Scheduler,
        user: UserRef,
        date: NaiveDate,
        now: NaiveDateTime,
    ) -> Self {
        let sessions: Vec<AttendanceSession> = scheduler
            .planned_sessions_on(date)
            .into_iter()
            .map(AttendanceSession::planned)
            .collect();

        let mut record = Self {
            id: Uuid::new_v4().to_string(),
            schedule: ScheduleRef {
                id: scheduler.id.clone(),
                name: scheduler.schedule_name.clone(),
                date,
            },
            user,
            sessions,
            overall_status: StatusType::Absent,
            marked_by: MarkedBy::Own,
            total_work_minutes: 0,
            created_at: now,
            updated_at: now,
        };
        record.recompute();
        record
    }

    pub fn date(&self) -> NaiveDate {
        self.schedule.date
    }

    /// Index of the session currently clocked in, if any.
    pub fn open_session(&self) -> Option<usize> {
        self.sessions
            .iter()
            .position(|s| s.state() == SessionState::ClockedIn)
    }

    /// Latest clock event across all sessions of the day.
    pub fn last_event(&self) -> Option<NaiveDateTime> {
        self.sessions.iter().filter_map(|s| s.last_event()).max()
    }

    /// Refreshes the derived day-level fields from the sessions.
    pub fn recompute(&mut self) {
        self.overall_status = overall_status(&self.sessions);
        self.total_work_minutes = total_work_minutes(&self.sessions);
    }
}
