use crate::api::attendance::{
    AttendanceListResponse, ClockRequest, ClockResponse, DayExcuseRequest, ExcuseRequest,
};
use crate::engine::classifier::ToggleAction;
use crate::engine::day_aggregator::PeriodSummary;
use crate::engine::geofence::{GeoPoint, Geofence};
use crate::engine::schedule_aggregator::ScheduleSummary;
use crate::model::attendance::{
    Attendance, AttendanceSession, MarkedBy, Remark, ScheduleRef, StatusType, UserRef,
};
use crate::model::schedule::{DaySchedule, PlannedSession, Scheduler, Session, WeekDay};
use crate::service::attendance::ProgressSummary;
use crate::service::schedule::CreateScheduler;
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Practicum Attendance API",
        version = "1.0.0",
        description = r#"
## Practicum Attendance Service

Agencies publish weekly work schedules for a contract period; students clock in
and out against the sessions of each day.

### 🔹 Key Features
- **Schedules**
  - Weekly templates with per-day sessions, optional geofence and photo proof
  - Weekly hours, contract hours and working days per schedule
- **Attendance**
  - One toggle endpoint: clocks out the open session or clocks into the next one
  - Sessions classified as present, late, undertime, overtime, excused or absent
  - Excuse approval by the owning agency, with an audit trail
  - Progress toward the contract hours

### 🕒 Time
All times are local wall-clock time taken from the server clock, never from the
client.

### 🔐 Security
Every endpoint requires a **JWT Bearer** access token. Roles: **admin**,
**agency**, **student**.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::schedule::create_schedule,
        crate::api::schedule::list_schedules,
        crate::api::schedule::get_schedule,
        crate::api::schedule::schedule_summary,

        crate::api::attendance::clock,
        crate::api::attendance::today,
        crate::api::attendance::list_attendance,
        crate::api::attendance::attendance_summary,
        crate::api::attendance::get_attendance,
        crate::api::attendance::excuse_session,
        crate::api::attendance::excuse_day
    ),
    components(
        schemas(
            WeekDay,
            Session,
            DaySchedule,
            Scheduler,
            PlannedSession,
            GeoPoint,
            Geofence,
            CreateScheduler,
            ScheduleSummary,
            StatusType,
            MarkedBy,
            Remark,
            AttendanceSession,
            ScheduleRef,
            UserRef,
            Attendance,
            ToggleAction,
            ClockRequest,
            ClockResponse,
            ExcuseRequest,
            DayExcuseRequest,
            AttendanceListResponse,
            PeriodSummary,
            ProgressSummary
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Schedule", description = "Schedule authoring and hour totals"),
        (name = "Attendance", description = "Clocking, day records and excuses"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
