use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::schedule::{PlannedSession, Scheduler, Session, WeekDay};

/// Planning-time totals for a scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScheduleSummary {
    pub scheduler_id: String,
    #[schema(example = 40.0)]
    pub weekly_hours: f64,
    #[schema(example = 680.0)]
    pub contract_hours: f64,
    #[schema(example = 85)]
    pub total_working_days: u32,
}

/// Hours in one template week, counting only available days.
pub fn weekly_hours(scheduler: &Scheduler) -> f64 {
    let minutes: i64 = scheduler
        .weekly_schedule
        .iter()
        .flat_map(|day| day.working_sessions())
        .map(Session::minutes)
        .sum();

    minutes as f64 / 60.0
}

/// Hours over the whole contract, walking every calendar date in range.
pub fn contract_hours(scheduler: &Scheduler) -> f64 {
    let minutes: i64 = scheduler
        .expand()
        .iter()
        .map(PlannedSession::planned_minutes)
        .sum();

    minutes as f64 / 60.0
}

/// Dates in range whose weekday is marked available.
///
/// An available day with no sessions still counts.
pub fn total_working_days(scheduler: &Scheduler) -> u32 {
    scheduler
        .dates()
        .filter(|date| {
            scheduler
                .day(WeekDay::of(*date))
                .is_some_and(|day| day.available)
        })
        .count() as u32
}

pub fn summarize(scheduler: &Scheduler) -> ScheduleSummary {
    ScheduleSummary {
        scheduler_id: scheduler.id.clone(),
        weekly_hours: weekly_hours(scheduler),
        contract_hours: contract_hours(scheduler),
        total_working_days: total_working_days(scheduler),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::schedule::fixtures::*;
    use crate::model::schedule::DaySchedule;
    use strum::IntoEnumIterator;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn empty_weekly_schedule_is_all_zero() {
        let sched = scheduler(date(2026, 1, 1), date(2026, 12, 31), Vec::new());
        assert_eq!(weekly_hours(&sched), 0.0);
        assert_eq!(contract_hours(&sched), 0.0);
        assert_eq!(total_working_days(&sched), 0);
    }

    #[test]
    fn single_unavailable_day_is_zero() {
        // 2026-01-10 is a Saturday
        let sched = scheduler(date(2026, 1, 10), date(2026, 1, 10), office_week());
        assert_eq!(contract_hours(&sched), 0.0);
        assert_eq!(total_working_days(&sched), 0);
    }

    #[test]
    fn single_available_day_counts_once() {
        let sched = scheduler(date(2026, 1, 5), date(2026, 1, 5), office_week());
        assert!(approx(contract_hours(&sched), 8.0));
        assert_eq!(total_working_days(&sched), 1);
    }

    #[test]
    fn office_week_totals() {
        // Mon 2026-01-05 .. Fri 2026-01-30: four full weeks
        let sched = scheduler(date(2026, 1, 5), date(2026, 1, 30), office_week());
        assert!(approx(weekly_hours(&sched), 40.0));
        assert!(approx(contract_hours(&sched), 160.0));
        assert_eq!(total_working_days(&sched), 20);
    }

    #[test]
    fn fractional_hours_are_kept() {
        let sched = scheduler(
            date(2026, 1, 5),
            date(2026, 1, 11),
            vec![day(WeekDay::Monday, true, vec![session((9, 0), (9, 45))])],
        );
        assert!(approx(weekly_hours(&sched), 0.75));
        assert!(approx(contract_hours(&sched), 0.75));
    }

    #[test]
    fn sessions_missing_bounds_and_inverted_windows_contribute_nothing() {
        let mut open_ended = session((9, 0), (12, 0));
        open_ended.end = None;
        let sched = scheduler(
            date(2026, 1, 5),
            date(2026, 1, 5),
            vec![day(
                WeekDay::Monday,
                true,
                vec![open_ended, session((14, 0), (13, 0)), session((13, 0), (15, 0))],
            )],
        );
        assert!(approx(weekly_hours(&sched), 2.0));
        assert!(approx(contract_hours(&sched), 2.0));
    }

    #[test]
    fn available_day_without_sessions_is_a_working_day() {
        let sched = scheduler(
            date(2026, 1, 5),
            date(2026, 1, 18),
            vec![day(WeekDay::Wednesday, true, Vec::new())],
        );
        assert_eq!(total_working_days(&sched), 2);
        assert_eq!(contract_hours(&sched), 0.0);
    }

    #[test]
    fn fully_unavailable_week_is_zero_not_error() {
        let weekly: Vec<DaySchedule> = WeekDay::iter()
            .map(|d| day(d, false, vec![session((8, 0), (17, 0))]))
            .collect();
        let sched = scheduler(date(2026, 1, 1), date(2026, 3, 31), weekly);
        assert_eq!(weekly_hours(&sched), 0.0);
        assert_eq!(contract_hours(&sched), 0.0);
        assert_eq!(total_working_days(&sched), 0);
    }

    #[test]
    fn contract_hours_bounded_by_weekly_rate_times_weeks_spanned() {
        let week = office_week();
        let ranges = [
            (date(2026, 1, 1), date(2026, 1, 1)),
            (date(2026, 1, 3), date(2026, 1, 12)),
            (date(2026, 2, 20), date(2026, 3, 9)),
            (date(2026, 1, 1), date(2026, 12, 31)),
        ];

        for (start, end) in ranges {
            let sched = scheduler(start, end, week.clone());
            let days = (end - start).num_days() + 1;
            let weeks = (days + 6) / 7;
            assert!(
                contract_hours(&sched) <= weekly_hours(&sched) * weeks as f64 + 1e-9,
                "range {start}..={end}"
            );
        }
    }

    #[test]
    fn summary_bundles_the_three_figures() {
        let sched = scheduler(date(2026, 1, 5), date(2026, 1, 9), office_week());
        let summary = summarize(&sched);
        assert_eq!(summary.scheduler_id, "sched-1");
        assert!(approx(summary.weekly_hours, 40.0));
        assert!(approx(summary.contract_hours, 40.0));
        assert_eq!(summary.total_working_days, 5);
    }
}
