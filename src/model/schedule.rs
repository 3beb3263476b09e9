use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::engine::geofence::Geofence;
use crate::error::AttendanceError;

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
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WeekDay {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl From<Weekday> for WeekDay {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => WeekDay::Monday,
            Weekday::Tue => WeekDay::Tuesday,
            Weekday::Wed => WeekDay::Wednesday,
            Weekday::Thu => WeekDay::Thursday,
            Weekday::Fri => WeekDay::Friday,
            Weekday::Sat => WeekDay::Saturday,
            Weekday::Sun => WeekDay::Sunday,
        }
    }
}

impl WeekDay {
    pub fn of(date: NaiveDate) -> Self {
        date.weekday().into()
    }
}

/// One work window inside a day of the weekly template.
///
/// `start`/`end` are optional so that partially authored documents still load;
/// aggregation treats a session missing either bound as zero minutes, and
/// [`Session::validate`] rejects it when a schedule is saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Session {
    #[schema(example = "09:00:00", value_type = Option<String>)]
    pub start: Option<NaiveTime>,
    #[schema(example = "17:00:00", value_type = Option<String>)]
    pub end: Option<NaiveTime>,
    #[serde(default)]
    pub requires_photo_start: bool,
    #[serde(default)]
    pub requires_photo_end: bool,
    #[serde(default)]
    #[schema(example = 15)]
    pub late_threshold_mins: Option<u32>,
    #[serde(default)]
    #[schema(example = 10)]
    pub undertime_threshold_mins: Option<u32>,
}

impl Session {
    /// Start and end when both are present.
    pub fn window(&self) -> Option<(NaiveTime, NaiveTime)> {
        Some((self.start?, self.end?))
    }

    /// Planned minutes, never negative; 0 when a bound is missing.
    pub fn minutes(&self) -> i64 {
        self.window()
            .map_or(0, |(start, end)| (end - start).num_minutes().max(0))
    }

    pub fn validate(&self) -> Result<(), AttendanceError> {
        match self.window() {
            Some((start, end)) if start < end => Ok(()),
            Some((start, end)) => Err(AttendanceError::InvalidSchedule(format!(
                "session start {start} must be before end {end}"
            ))),
            None => Err(AttendanceError::InvalidSchedule(
                "session start and end are required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DaySchedule {
    pub day: WeekDay,
    pub available: bool,
    #[serde(default)]
    pub sessions: Vec<Session>,
}

impl DaySchedule {
    /// Sessions that count for this day; none when the day is unavailable.
    pub fn working_sessions(&self) -> &[Session] {
        if self.available { &self.sessions } else { &[] }
    }
}

/// Agency-owned weekly template bounded by a contract date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Scheduler {
    #[schema(example = "6f1c2d9e-4a55-4c8e-9d62-2f1b7a3e0c11")]
    pub id: String,
    #[schema(example = 12)]
    pub owner_agency_id: u64,
    #[schema(example = "BSIT Practicum 2026")]
    pub schedule_name: String,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-04-30", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    #[serde(default)]
    pub weekly_schedule: Vec<DaySchedule>,
    #[serde(default)]
    pub geofence: Option<Geofence>,
    #[serde(default)]
    #[schema(example = 30)]
    pub early_clock_in_mins: u32,
    #[schema(example = "2026-01-01T08:00:00", format = "date-time", value_type = String)]
    pub created_at: NaiveDateTime,
    #[schema(example = "2026-01-01T08:00:00", format = "date-time", value_type = String)]
    pub updated_at: NaiveDateTime,
}

impl Scheduler {
    /// The template entry for `day`, if one was defined.
    pub fn day(&self, day: WeekDay) -> Option<&DaySchedule> {
        self.weekly_schedule.iter().find(|d| d.day == day)
    }

    /// Every calendar date of the contract, inclusive on both ends.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start_date
            .iter_days()
            .take_while(move |date| *date <= self.end_date)
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    pub fn validate(&self) -> Result<(), AttendanceError> {
        if self.schedule_name.trim().is_empty() {
            return Err(AttendanceError::InvalidSchedule(
                "schedule name must not be empty".to_string(),
            ));
        }

        if self.start_date > self.end_date {
            return Err(AttendanceError::InvalidSchedule(format!(
                "start date {} is after end date {}",
                self.start_date, self.end_date
            )));
        }

        for (i, day) in self.weekly_schedule.iter().enumerate() {
            if self.weekly_schedule[..i].iter().any(|d| d.day == day.day) {
                return Err(AttendanceError::InvalidSchedule(format!(
                    "{} is defined more than once",
                    day.day
                )));
            }

            for session in day.working_sessions() {
                session.validate().map_err(|e| match e {
                    AttendanceError::InvalidSchedule(msg) => {
                        AttendanceError::InvalidSchedule(format!("{}: {msg}", day.day))
                    }
                    other => other,
                })?;
            }
        }

        if let Some(fence) = &self.geofence {
            if !(fence.radius_m > 0.0) {
                return Err(AttendanceError::InvalidSchedule(
                    "geofence radius must be positive".to_string(),
                ));
            }
            if !fence.center.is_valid() {
                return Err(AttendanceError::InvalidSchedule(
                    "geofence center is outside valid coordinates".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Sessions planned for one calendar date. Empty outside the contract
    /// range, on unavailable days, and for sessions without both bounds.
    pub fn planned_sessions_on(&self, date: NaiveDate) -> Vec<PlannedSession> {
        if !self.covers(date) {
            return Vec::new();
        }

        let Some(day) = self.day(WeekDay::of(date)) else {
            return Vec::new();
        };

        day.working_sessions()
            .iter()
            .filter_map(|session| {
                let (start, end) = session.window()?;
                Some(PlannedSession {
                    date,
                    start,
                    end,
                    requires_photo_start: session.requires_photo_start,
                    requires_photo_end: session.requires_photo_end,
                    late_threshold_mins: session.late_threshold_mins,
                    undertime_threshold_mins: session.undertime_threshold_mins,
                    geofence: self.geofence,
                    early_clock_in_mins: self.early_clock_in_mins,
                })
            })
            .collect()
    }

    /// Expands the template across the whole contract range.
    pub fn expand(&self) -> Vec<PlannedSession> {
        self.dates()
            .flat_map(|date| self.planned_sessions_on(date))
            .collect()
    }
}

/// A template session bound to a calendar date.
///
/// Attendance sessions keep their own copy so later template edits never
/// rewrite history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlannedSession {
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(example = "09:00:00", value_type = String)]
    pub start: NaiveTime,
    #[schema(example = "17:00:00", value_type = String)]
    pub end: NaiveTime,
    pub requires_photo_start: bool,
    pub requires_photo_end: bool,
    pub late_threshold_mins: Option<u32>,
    pub undertime_threshold_mins: Option<u32>,
    pub geofence: Option<Geofence>,
    pub early_clock_in_mins: u32,
}

impl PlannedSession {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.date.and_time(self.end)
    }

    /// Earliest accepted clock-in.
    pub fn opens_at(&self) -> NaiveDateTime {
        self.starts_at() - Duration::minutes(i64::from(self.early_clock_in_mins))
    }

    /// A clock-in strictly after this instant is late.
    pub fn late_after(&self) -> NaiveDateTime {
        self.starts_at() + Duration::minutes(i64::from(self.late_threshold_mins.unwrap_or(0)))
    }

    /// A clock-out strictly before this instant is undertime.
    pub fn undertime_before(&self) -> NaiveDateTime {
        self.ends_at() - Duration::minutes(i64::from(self.undertime_threshold_mins.unwrap_or(0)))
    }

    pub fn planned_minutes(&self) -> i64 {
        (self.ends_at() - self.starts_at()).num_minutes().max(0)
    }
}
