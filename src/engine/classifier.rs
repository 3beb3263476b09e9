use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use utoipa::ToSchema;

use crate::engine::geofence::GeoPoint;
use crate::error::{AttendanceError, ProofKind};
use crate::model::attendance::{
    Attendance, AttendanceSession, MarkedBy, Remark, SessionState, StatusType,
};
use crate::model::schedule::PlannedSession;

/// A single clock-in or clock-out attempt as observed at the boundary.
///
/// `at` must already be server-synchronized time.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockEvent {
    pub at: NaiveDateTime,
    pub location: Option<GeoPoint>,
    pub photo_url: Option<String>,
}

impl ClockEvent {
    pub fn at(at: NaiveDateTime) -> Self {
        Self {
            at,
            location: None,
            photo_url: None,
        }
    }

    fn has_photo(&self) -> bool {
        self.photo_url.as_deref().is_some_and(|url| !url.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToggleAction {
    ClockIn,
    ClockOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub action: ToggleAction,
    pub session_index: usize,
}

/// Status set implied by the recorded timestamps.
///
/// `present` only appears when no other flag applies.
pub fn classify(
    planned: &PlannedSession,
    check_in: Option<NaiveDateTime>,
    check_out: Option<NaiveDateTime>,
) -> BTreeSet<StatusType> {
    let mut status = BTreeSet::new();

    let Some(check_in) = check_in else {
        return status;
    };

    if check_in > planned.late_after() {
        status.insert(StatusType::Late);
    }

    if let Some(check_out) = check_out {
        if check_out < planned.undertime_before() {
            status.insert(StatusType::Undertime);
        } else if check_out > planned.ends_at() {
            status.insert(StatusType::Overtime);
        }
    }

    if status.is_empty() {
        status.insert(StatusType::Present);
    }

    status
}

fn check_location(planned: &PlannedSession, event: &ClockEvent) -> Result<(), AttendanceError> {
    if let Some(fence) = &planned.geofence {
        fence.check(event.location.as_ref())?;
    }
    Ok(())
}

/// `NotStarted -> ClockedIn`. On error the session is left untouched.
pub fn clock_in(session: &mut AttendanceSession, event: &ClockEvent) -> Result<(), AttendanceError> {
    if session.state() != SessionState::NotStarted {
        return Err(AttendanceError::SessionClosed);
    }

    let planned = &session.schedule;

    if event.at < planned.opens_at() {
        return Err(AttendanceError::ClockInTooEarly {
            opens_at: planned.opens_at(),
        });
    }

    if event.at > planned.ends_at() {
        return Err(AttendanceError::SessionClosed);
    }

    check_location(planned, event)?;

    if planned.requires_photo_start && !event.has_photo() {
        return Err(AttendanceError::MissingProof {
            kind: ProofKind::ClockIn,
        });
    }

    session.check_in = Some(event.at);
    session.geo_location = event.location;
    session.photo_start_url = event.photo_url.clone();
    session.status = classify(&session.schedule, session.check_in, None);

    Ok(())
}

/// `ClockedIn -> Completed`. On error the session is left untouched.
pub fn clock_out(
    session: &mut AttendanceSession,
    event: &ClockEvent,
) -> Result<(), AttendanceError> {
    let Some(check_in) = session.check_in else {
        return Err(AttendanceError::NoOpenSession);
    };

    if session.state() != SessionState::ClockedIn {
        return Err(AttendanceError::SessionClosed);
    }

    if event.at < check_in {
        return Err(AttendanceError::StaleClock {
            at: event.at,
            last: check_in,
        });
    }

    let planned = &session.schedule;

    check_location(planned, event)?;

    if planned.requires_photo_end && !event.has_photo() {
        return Err(AttendanceError::MissingProof {
            kind: ProofKind::ClockOut,
        });
    }

    session.check_out = Some(event.at);
    if event.location.is_some() {
        session.geo_location = event.location;
    }
    session.photo_end_url = event.photo_url.clone();
    session.status = classify(&session.schedule, session.check_in, session.check_out);

    Ok(())
}

/// Marks a never-started session absent once its window has passed.
/// Returns whether the session changed.
pub fn mark_absent_if_elapsed(session: &mut AttendanceSession, now: NaiveDateTime) -> bool {
    if session.state() == SessionState::NotStarted && now > session.schedule.ends_at() {
        session.status = BTreeSet::from([StatusType::Absent]);
        return true;
    }
    false
}

/// Applies an approved excuse. Prior statuses are kept in the audit remark.
pub fn excuse(
    session: &mut AttendanceSession,
    at: NaiveDateTime,
    by: MarkedBy,
    reason: &str,
) -> Result<(), AttendanceError> {
    let previous = session.state();
    if previous == SessionState::Excused {
        return Err(AttendanceError::AlreadyExcused);
    }

    let was = if session.status.is_empty() {
        previous.to_string()
    } else {
        session
            .status
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };

    session.status = BTreeSet::from([StatusType::Excused]);
    session.remarks.push(Remark {
        at,
        by,
        note: format!("Excused: {} (was: {was})", reason.trim()),
    });

    Ok(())
}

/// Sweeps elapsed sessions to absent and refreshes the day fields.
pub fn refresh_day(attendance: &mut Attendance, now: NaiveDateTime) -> bool {
    let mut changed = false;
    for session in &mut attendance.sessions {
        changed |= mark_absent_if_elapsed(session, now);
    }
    if changed {
        attendance.recompute();
    }
    changed
}

/// Clocks out the open session if there is one, otherwise clocks into the
/// next session that has not started and whose window is still open.
///
/// The record is only modified when the whole transition succeeds.
pub fn toggle_clock(
    attendance: &mut Attendance,
    event: &ClockEvent,
) -> Result<ToggleOutcome, AttendanceError> {
    if let Some(last) = attendance.last_event() {
        if event.at < last {
            return Err(AttendanceError::StaleClock { at: event.at, last });
        }
    }

    let mut draft = attendance.clone();
    for session in &mut draft.sessions {
        mark_absent_if_elapsed(session, event.at);
    }

    let outcome = match draft.open_session() {
        Some(index) => {
            clock_out(&mut draft.sessions[index], event)?;
            ToggleOutcome {
                action: ToggleAction::ClockOut,
                session_index: index,
            }
        }
        None => {
            let index = draft
                .sessions
                .iter()
                .position(|s| s.state() == SessionState::NotStarted)
                .ok_or(AttendanceError::NoOpenSession)?;
            clock_in(&mut draft.sessions[index], event)?;
            ToggleOutcome {
                action: ToggleAction::ClockIn,
                session_index: index,
            }
        }
    };

    draft.marked_by = MarkedBy::Own;
    draft.updated_at = event.at;
    draft.recompute();
    *attendance = draft;

    Ok(outcome)
}
