use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::auth::AuthUser;
use crate::engine::classifier::{self, ClockEvent, ToggleOutcome};
use crate::engine::day_aggregator::{PeriodSummary, summarize_period};
use crate::error::{AppError, AttendanceError};
use crate::model::attendance::{Attendance, UserRef};
use crate::model::schedule::Scheduler;
use crate::store::{AttendanceFilter, AttendanceStore, StoreError, Versioned};
use crate::utils::schedule_cache;

pub async fn load_scheduler(
    store: &dyn AttendanceStore,
    scheduler_id: &str,
) -> Result<Scheduler, AppError> {
    store
        .get_scheduler(scheduler_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Schedule {scheduler_id}")))
}

pub async fn load_attendance(
    store: &dyn AttendanceStore,
    attendance_id: &str,
) -> Result<Versioned<Attendance>, AppError> {
    store
        .get_attendance(attendance_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Attendance {attendance_id}")))
}

/// Writes `record` only if the stored copy is still at `expected_version`.
/// A lost race surfaces as the retryable [`AttendanceError::ConcurrencyConflict`].
pub async fn commit(
    store: &dyn AttendanceStore,
    record: &Attendance,
    expected_version: Option<u64>,
) -> Result<u64, AppError> {
    match store.put_attendance(record, expected_version).await {
        Ok(version) => Ok(version),
        Err(StoreError::Conflict(id)) => {
            tracing::info!(attendance_id = %id, user_id = record.user.id, "Lost attendance write race");
            Err(AttendanceError::ConcurrencyConflict.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// The stored day record for `user` on `date`, or an unsaved placeholder
/// holding the day's planned sessions.
///
/// A user keeps one record per day, so a stored record that belongs to a
/// different scheduler is rejected.
async fn day_record(
    store: &dyn AttendanceStore,
    scheduler: &Scheduler,
    user: UserRef,
    date: NaiveDate,
    now: NaiveDateTime,
) -> Result<(Attendance, Option<u64>), AppError> {
    match store.find_attendance(user.id, date).await? {
        Some(Versioned { doc, .. }) if doc.schedule.id != scheduler.id => {
            Err(AppError::BadRequest(format!(
                "Attendance on {date} is tracked under schedule {}",
                doc.schedule.id
            )))
        }
        Some(Versioned { version, doc }) => Ok((doc, Some(version))),
        None => Ok((Attendance::placeholder(scheduler, user, date, now), None)),
    }
}

/// Result of a committed toggle.
#[derive(Debug, Clone)]
pub struct Toggled {
    pub outcome: ToggleOutcome,
    pub attendance: Attendance,
    pub version: u64,
}

/// Clocks `user` in or out of the next session of the event's day.
///
/// Loads (or creates) the day record, applies the transition and commits it
/// with compare-and-swap, so two simultaneous toggles can never leave two
/// open sessions behind.
pub async fn toggle(
    store: &dyn AttendanceStore,
    scheduler_id: &str,
    user: UserRef,
    event: ClockEvent,
) -> Result<Toggled, AppError> {
    let scheduler = load_scheduler(store, scheduler_id).await?;
    let date = event.at.date();

    let (mut record, expected) = day_record(store, &scheduler, user, date, event.at).await?;
    let outcome = classifier::toggle_clock(&mut record, &event)?;
    let version = commit(store, &record, expected).await?;

    tracing::info!(
        attendance_id = %record.id,
        user_id = record.user.id,
        schedule_id = %scheduler.id,
        action = %outcome.action,
        session = outcome.session_index,
        "Clock toggled"
    );

    Ok(Toggled {
        outcome,
        attendance: record,
        version,
    })
}

/// Display view of `user`'s day with elapsed sessions shown as absent.
/// Nothing is written.
pub async fn today(
    store: &dyn AttendanceStore,
    scheduler_id: &str,
    user: UserRef,
    now: NaiveDateTime,
) -> Result<Attendance, AppError> {
    let scheduler = load_scheduler(store, scheduler_id).await?;
    let (mut record, _) = day_record(store, &scheduler, user, now.date(), now).await?;
    classifier::refresh_day(&mut record, now);
    Ok(record)
}

fn excuse_reason(reason: &str) -> Result<&str, AppError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AppError::BadRequest("An excuse needs a reason".to_string()));
    }
    Ok(reason)
}

fn apply_excuse(
    record: &mut Attendance,
    actor: &AuthUser,
    session_index: usize,
    reason: &str,
    now: NaiveDateTime,
) -> Result<(), AppError> {
    let session = record
        .sessions
        .get_mut(session_index)
        .ok_or_else(|| AppError::NotFound(format!("Session {session_index}")))?;
    classifier::excuse(session, now, actor.marked_by(), reason)?;

    record.marked_by = actor.marked_by();
    record.updated_at = now;
    record.recompute();
    Ok(())
}

/// Marks one session of a stored day record as excused.
pub async fn excuse_session(
    store: &dyn AttendanceStore,
    actor: &AuthUser,
    attendance_id: &str,
    session_index: usize,
    reason: &str,
    now: NaiveDateTime,
) -> Result<Attendance, AppError> {
    let reason = excuse_reason(reason)?;

    let Versioned { version, mut doc } = load_attendance(store, attendance_id).await?;
    let scheduler = load_scheduler(store, &doc.schedule.id).await?;
    actor.require_manager_of(&scheduler)?;

    apply_excuse(&mut doc, actor, session_index, reason, now)?;
    commit(store, &doc, Some(version)).await?;

    tracing::info!(
        attendance_id = %doc.id,
        session = session_index,
        by = actor.user_id,
        "Session excused"
    );
    Ok(doc)
}

/// Identifies a student's day by scheduler and date rather than record id.
#[derive(Debug, Clone)]
pub struct DayRef<'a> {
    pub scheduler_id: &'a str,
    pub user_id: u64,
    pub date: NaiveDate,
}

/// Excuses a session of a student's day, saving the day record first when
/// the student never clocked that day.
pub async fn excuse_day_session(
    store: &dyn AttendanceStore,
    actor: &AuthUser,
    day: DayRef<'_>,
    session_index: usize,
    reason: &str,
    now: NaiveDateTime,
) -> Result<Attendance, AppError> {
    let reason = excuse_reason(reason)?;

    let scheduler = load_scheduler(store, day.scheduler_id).await?;
    actor.require_manager_of(&scheduler)?;
    if scheduler.planned_sessions_on(day.date).is_empty() {
        return Err(AppError::NotFound(format!(
            "Sessions planned on {} in schedule {}",
            day.date, scheduler.id
        )));
    }

    let user = known_user(store, &scheduler, day.user_id).await?;
    let (mut record, expected) = day_record(store, &scheduler, user, day.date, now).await?;
    classifier::refresh_day(&mut record, now);

    apply_excuse(&mut record, actor, session_index, reason, now)?;
    let version = commit(store, &record, expected).await?;

    tracing::info!(
        attendance_id = %record.id,
        user_id = day.user_id,
        date = %day.date,
        session = session_index,
        version,
        by = actor.user_id,
        "Session excused"
    );
    Ok(record)
}

/// Name the student used on an earlier record of `scheduler`, if any.
async fn known_user(
    store: &dyn AttendanceStore,
    scheduler: &Scheduler,
    user_id: u64,
) -> Result<UserRef, AppError> {
    let filter = AttendanceFilter {
        schedule_id: Some(scheduler.id.clone()),
        page: Some(1),
        per_page: Some(1),
        ..AttendanceFilter::for_user(user_id, None, None)
    };
    let earlier = store.query_attendance(&filter).await?.data.into_iter().next();

    Ok(earlier.map(|record| record.user).unwrap_or_else(|| UserRef {
        id: user_id,
        name: user_id.to_string(),
    }))
}

/// Progress of one student toward the contract hours of a scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ProgressSummary {
    pub scheduler_id: String,
    #[schema(example = 1001)]
    pub user_id: u64,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub from: NaiveDate,
    #[schema(example = "2026-04-30", format = "date", value_type = String)]
    pub to: NaiveDate,
    pub period: PeriodSummary,
    #[schema(example = 486.0)]
    pub contract_hours: f64,
    #[schema(example = 326.0)]
    pub remaining_hours: f64,
    /// Share of contract hours already worked, 0-100
    #[schema(example = 32.9)]
    pub progress_pct: f64,
}

/// Sums `user_id`'s day records between `from` and `to` (defaulting to the
/// contract range) against the scheduler's contract hours.
///
/// Elapsed sessions are read as absent, and planned days up to `now` that
/// have no record at all count as missed absent days.
pub async fn period_summary(
    store: &dyn AttendanceStore,
    scheduler: &Scheduler,
    user_id: u64,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    now: NaiveDateTime,
) -> Result<ProgressSummary, AppError> {
    let from = from.unwrap_or(scheduler.start_date);
    let to = to.unwrap_or(scheduler.end_date);
    if from > to {
        return Err(AppError::BadRequest(format!(
            "from {from} is after to {to}"
        )));
    }

    let filter = AttendanceFilter {
        schedule_id: Some(scheduler.id.clone()),
        ..AttendanceFilter::for_user(user_id, Some(from), Some(to))
    };
    let mut records = store.query_attendance(&filter).await?.data;
    for record in &mut records {
        classifier::refresh_day(record, now);
    }
    let mut period = summarize_period(&records);

    let recorded: BTreeSet<NaiveDate> = records.iter().map(Attendance::date).collect();
    let last = to.min(now.date());
    for date in scheduler
        .dates()
        .filter(|date| *date >= from && *date <= last && !recorded.contains(date))
    {
        let planned = scheduler.planned_sessions_on(date);
        if !planned.is_empty() && planned.iter().all(|p| now > p.ends_at()) {
            period.add_missed_day();
        }
    }

    let contract_hours = schedule_cache::summary_for(scheduler).await.contract_hours;
    let remaining_hours = (contract_hours - period.total_work_hours).max(0.0);
    let progress_pct = if contract_hours > 0.0 {
        (period.total_work_hours * 100.0 / contract_hours).min(100.0)
    } else {
        0.0
    };

    Ok(ProgressSummary {
        scheduler_id: scheduler.id.clone(),
        user_id,
        from,
        to,
        period,
        contract_hours,
        remaining_hours,
        progress_pct,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::classifier::ToggleAction;
    use crate::model::attendance::{MarkedBy, SessionState, StatusType};
    use crate::model::role::Role;
    use crate::model::schedule::fixtures::*;
    use crate::store::MemoryStore;

    fn student() -> UserRef {
        UserRef {
            id: 42,
            name: "ana".to_string(),
        }
    }

    fn agency(agency_id: u64) -> AuthUser {
        AuthUser {
            user_id: 900,
            username: "agency".to_string(),
            role: Role::Agency,
            agency_id: Some(agency_id),
        }
    }

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        date(2026, 1, day).and_time(time(h, m))
    }

    async fn seeded(id: &str) -> MemoryStore {
        let store = MemoryStore::new();
        let mut sched = scheduler(date(2026, 1, 5), date(2026, 1, 9), office_week());
        sched.id = id.to_string();
        sched.early_clock_in_mins = 15;
        store.put_scheduler(&sched).await.unwrap();
        store
    }

    #[actix_web::test]
    async fn toggles_through_a_full_day() {
        let store = seeded("svc-day").await;

        let first = toggle(&store, "svc-day", student(), ClockEvent::at(at(5, 7, 50)))
            .await
            .unwrap();
        assert_eq!(first.outcome.action, ToggleAction::ClockIn);
        assert_eq!(first.version, 1);

        let second = toggle(&store, "svc-day", student(), ClockEvent::at(at(5, 12, 0)))
            .await
            .unwrap();
        assert_eq!(second.outcome.action, ToggleAction::ClockOut);
        assert_eq!(second.version, 2);
        assert_eq!(second.attendance.id, first.attendance.id);

        let third = toggle(&store, "svc-day", student(), ClockEvent::at(at(5, 13, 20)))
            .await
            .unwrap();
        assert_eq!(third.outcome.session_index, 1);
        assert!(
            third.attendance.sessions[1]
                .status
                .contains(&StatusType::Late)
        );
        assert_eq!(third.attendance.overall_status, StatusType::Late);
    }

    #[actix_web::test]
    async fn unknown_scheduler_is_not_found() {
        let store = MemoryStore::new();
        let err = toggle(&store, "nope", student(), ClockEvent::at(at(5, 8, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[actix_web::test]
    async fn rejected_toggle_writes_nothing() {
        let store = seeded("svc-reject").await;

        // before 07:45
        let err = toggle(&store, "svc-reject", student(), ClockEvent::at(at(5, 7, 0)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Attendance(AttendanceError::ClockInTooEarly { .. })
        ));
        assert!(
            store
                .find_attendance(42, date(2026, 1, 5))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[actix_web::test]
    async fn simultaneous_first_toggles_open_exactly_one_session() {
        let store = seeded("svc-race").await;
        let sched = store.get_scheduler("svc-race").await.unwrap().unwrap();
        let day = date(2026, 1, 5);

        // both requests read "no record yet" before either commits
        let mut a = Attendance::placeholder(&sched, student(), day, at(5, 7, 55));
        let mut b = Attendance::placeholder(&sched, student(), day, at(5, 7, 55));
        classifier::toggle_clock(&mut a, &ClockEvent::at(at(5, 7, 55))).unwrap();
        classifier::toggle_clock(&mut b, &ClockEvent::at(at(5, 7, 55))).unwrap();

        assert_eq!(commit(&store, &a, None).await.unwrap(), 1);
        let lost = commit(&store, &b, None).await.unwrap_err();
        assert!(matches!(
            lost,
            AppError::Attendance(AttendanceError::ConcurrencyConflict)
        ));

        let stored = store.find_attendance(42, day).await.unwrap().unwrap();
        let open = stored
            .doc
            .sessions
            .iter()
            .filter(|s| s.state() == SessionState::ClockedIn)
            .count();
        assert_eq!(open, 1);
        assert_eq!(stored.doc.id, a.id);
    }

    #[actix_web::test]
    async fn stale_version_update_conflicts_and_keeps_stored_record() {
        let store = seeded("svc-cas").await;
        let first = toggle(&store, "svc-cas", student(), ClockEvent::at(at(5, 8, 0)))
            .await
            .unwrap();

        // two readers of version 1 both clock out
        let mut a = first.attendance.clone();
        let mut b = first.attendance.clone();
        classifier::toggle_clock(&mut a, &ClockEvent::at(at(5, 11, 0))).unwrap();
        classifier::toggle_clock(&mut b, &ClockEvent::at(at(5, 12, 0))).unwrap();

        assert_eq!(commit(&store, &a, Some(1)).await.unwrap(), 2);
        assert!(commit(&store, &b, Some(1)).await.is_err());

        let stored = store.get_attendance(&first.attendance.id).await.unwrap().unwrap();
        assert_eq!(stored.doc.sessions[0].check_out, Some(at(5, 11, 0)));
    }

    #[actix_web::test]
    async fn today_marks_elapsed_sessions_without_writing() {
        let store = seeded("svc-today").await;
        let view = today(&store, "svc-today", student(), at(5, 12, 30)).await.unwrap();

        assert_eq!(view.sessions[0].state(), SessionState::Absent);
        assert_eq!(view.sessions[1].state(), SessionState::NotStarted);
        assert!(
            store
                .find_attendance(42, date(2026, 1, 5))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[actix_web::test]
    async fn owning_agency_excuses_a_session() {
        let store = seeded("svc-excuse").await;
        // late clock-in, then out
        toggle(&store, "svc-excuse", student(), ClockEvent::at(at(5, 8, 30)))
            .await
            .unwrap();
        let day = toggle(&store, "svc-excuse", student(), ClockEvent::at(at(5, 12, 0)))
            .await
            .unwrap()
            .attendance;

        let err = excuse_session(&store, &agency(8), &day.id, 0, "traffic", at(5, 18, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let excused = excuse_session(&store, &agency(7), &day.id, 0, "traffic", at(5, 18, 0))
            .await
            .unwrap();
        assert_eq!(excused.sessions[0].state(), SessionState::Excused);
        assert_eq!(excused.overall_status, StatusType::Excused);
        assert_eq!(excused.marked_by, MarkedBy::Agency);
        assert_eq!(
            excused.sessions[0].remarks[0].note,
            "Excused: traffic (was: late)"
        );

        let again = excuse_session(&store, &agency(7), &day.id, 0, "traffic", at(5, 18, 5))
            .await
            .unwrap_err();
        assert!(matches!(
            again,
            AppError::Attendance(AttendanceError::AlreadyExcused)
        ));

        let missing = excuse_session(&store, &agency(7), &day.id, 9, "traffic", at(5, 18, 5))
            .await
            .unwrap_err();
        assert!(matches!(missing, AppError::NotFound(_)));
    }

    #[actix_web::test]
    async fn period_summary_tracks_progress_against_contract() {
        let store = seeded("svc-summary").await;
        let sched = store.get_scheduler("svc-summary").await.unwrap().unwrap();

        for day in [5, 6] {
            toggle(&store, "svc-summary", student(), ClockEvent::at(at(day, 8, 0)))
                .await
                .unwrap();
            toggle(&store, "svc-summary", student(), ClockEvent::at(at(day, 12, 0)))
                .await
                .unwrap();
        }

        // Wednesday mid-morning: nothing has been missed yet
        let summary = period_summary(&store, &sched, 42, None, None, at(7, 10, 0))
            .await
            .unwrap();
        assert_eq!(summary.period.days_recorded, 2);
        assert_eq!(summary.period.days_missed, 0);
        assert_eq!(summary.period.total_work_minutes, 480);
        // Mon-Fri, 8h a day
        assert_eq!(summary.contract_hours, 40.0);
        assert_eq!(summary.remaining_hours, 32.0);
        assert_eq!(summary.progress_pct, 20.0);

        let err = period_summary(
            &store,
            &sched,
            42,
            Some(date(2026, 1, 9)),
            Some(date(2026, 1, 5)),
            at(7, 10, 0),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[actix_web::test]
    async fn days_without_any_record_count_as_absent() {
        let store = seeded("svc-missed").await;
        let sched = store.get_scheduler("svc-missed").await.unwrap().unwrap();
        toggle(&store, "svc-missed", student(), ClockEvent::at(at(5, 8, 0)))
            .await
            .unwrap();
        toggle(&store, "svc-missed", student(), ClockEvent::at(at(5, 12, 0)))
            .await
            .unwrap();

        // Friday evening: Tue-Fri never clocked
        let summary = period_summary(&store, &sched, 42, None, None, at(9, 18, 0))
            .await
            .unwrap();
        assert_eq!(summary.period.days_recorded, 1);
        assert_eq!(summary.period.days_missed, 4);
        assert_eq!(summary.period.days_by_status.get(&StatusType::Absent), Some(&4));
        assert_eq!(summary.period.days_by_status.get(&StatusType::Present), Some(&1));

        // a narrower window only counts its own days
        let summary = period_summary(
            &store,
            &sched,
            42,
            Some(date(2026, 1, 6)),
            Some(date(2026, 1, 7)),
            at(9, 18, 0),
        )
        .await
        .unwrap();
        assert_eq!(summary.period.days_missed, 2);
    }

    #[actix_web::test]
    async fn agency_excuses_a_day_the_student_never_clocked() {
        let store = seeded("svc-excuse-day").await;
        let sched = store.get_scheduler("svc-excuse-day").await.unwrap().unwrap();
        let wednesday = DayRef {
            scheduler_id: "svc-excuse-day",
            user_id: 42,
            date: date(2026, 1, 7),
        };

        let err = excuse_day_session(&store, &agency(8), wednesday.clone(), 0, "flu", at(7, 18, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(store.find_attendance(42, date(2026, 1, 7)).await.unwrap().is_none());

        let record = excuse_day_session(&store, &agency(7), wednesday.clone(), 0, "flu", at(7, 18, 0))
            .await
            .unwrap();
        assert_eq!(record.sessions[0].state(), SessionState::Excused);
        assert_eq!(record.sessions[1].state(), SessionState::Absent);
        assert_eq!(record.overall_status, StatusType::Excused);
        assert_eq!(record.user.id, 42);
        assert_eq!(
            record.sessions[0].remarks[0].note,
            "Excused: flu (was: absent)"
        );

        // second session goes through the stored record
        let record = excuse_day_session(&store, &agency(7), wednesday, 1, "flu", at(7, 18, 5))
            .await
            .unwrap();
        assert!(
            record
                .sessions
                .iter()
                .all(|s| s.state() == SessionState::Excused)
        );
        let stored = store.find_attendance(42, date(2026, 1, 7)).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.doc, record);

        let summary = period_summary(&store, &sched, 42, None, None, at(9, 18, 0))
            .await
            .unwrap();
        assert_eq!(summary.period.days_by_status.get(&StatusType::Excused), Some(&1));
        assert_eq!(summary.period.days_missed, 4);

        // weekend has nothing to excuse
        let saturday = DayRef {
            scheduler_id: "svc-excuse-day",
            user_id: 42,
            date: date(2026, 1, 10),
        };
        let err = excuse_day_session(&store, &agency(7), saturday, 0, "flu", at(10, 9, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[actix_web::test]
    async fn toggle_refuses_a_day_tracked_under_another_schedule() {
        let store = seeded("svc-first").await;
        let mut other = store.get_scheduler("svc-first").await.unwrap().unwrap();
        other.id = "svc-second".to_string();
        store.put_scheduler(&other).await.unwrap();

        let first = toggle(&store, "svc-first", student(), ClockEvent::at(at(5, 8, 0)))
            .await
            .unwrap();

        let err = toggle(&store, "svc-second", student(), ClockEvent::at(at(5, 12, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let stored = store.find_attendance(42, date(2026, 1, 5)).await.unwrap().unwrap();
        assert_eq!(stored.version, first.version);
        assert_eq!(stored.doc.open_session(), Some(0));
    }
}
