use crate::auth::auth::AuthUser;
use crate::clock::ServerClock;
use crate::engine::classifier::{ClockEvent, ToggleAction};
use crate::engine::geofence::GeoPoint;
use crate::error::AppError;
use crate::model::attendance::Attendance;
use crate::model::role::Role;
use crate::service::attendance::{
    self as service, DayRef, ProgressSummary, load_attendance, load_scheduler,
};
use crate::store::{AttendanceFilter, AttendanceStore};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct ClockRequest {
    #[schema(example = "6f1c2d9e-4a55-4c8e-9d62-2f1b7a3e0c11")]
    pub schedule_id: String,
    /// Device location; required when the schedule has a geofence
    pub location: Option<GeoPoint>,
    /// Reference to an already uploaded photo
    #[schema(example = "uploads/attendance/2026-01-05/1001-in.jpg")]
    pub photo_url: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ClockResponse {
    pub action: ToggleAction,
    #[schema(example = 0)]
    pub session_index: usize,
    pub attendance: Attendance,
}

#[derive(Deserialize, IntoParams)]
pub struct TodayQuery {
    /// Scheduler the caller is enrolled in
    pub schedule_id: String,
}

#[derive(Deserialize, IntoParams)]
pub struct SummaryQuery {
    /// Scheduler to measure progress against
    pub schedule_id: String,
    /// Student to summarize (agency/admin only; students get their own)
    pub user_id: Option<u64>,
    #[param(value_type = Option<String>, example = "2026-01-05")]
    pub from: Option<NaiveDate>,
    #[param(value_type = Option<String>, example = "2026-01-30")]
    pub to: Option<NaiveDate>,
}

#[derive(Deserialize, ToSchema)]
pub struct ExcuseRequest {
    #[schema(example = "medical appointment")]
    pub reason: String,
}

#[derive(Deserialize, ToSchema)]
pub struct DayExcuseRequest {
    #[schema(example = "6f1c2d9e-4a55-4c8e-9d62-2f1b7a3e0c11")]
    pub schedule_id: String,
    #[schema(example = 1001)]
    pub user_id: u64,
    #[schema(example = "2026-01-07", format = "date", value_type = String)]
    pub date: NaiveDate,
    /// Session position within the day
    #[schema(example = 0)]
    pub session_index: usize,
    #[schema(example = "medical appointment")]
    pub reason: String,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceListResponse {
    pub data: Vec<Attendance>,
    #[schema(example = 1)]
    pub page: u64,
    #[schema(example = 10)]
    pub per_page: u64,
    #[schema(example = 1)]
    pub total: i64,
}

/// Clock toggle endpoint
#[utoipa::path(
    post,
    path = "/api/v1/attendance/clock",
    request_body(
        content = ClockRequest,
        description = "Clock event for the caller; the time is taken from the server clock",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Clocked in or out", body = ClockResponse),
        (status = 400, description = "Coordinates out of range or day tracked under another schedule"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Scheduler not found"),
        (status = 409, description = "Concurrent toggle, stale event or nothing left to toggle", body = Object, example = json!({
            "error": "concurrency_conflict",
            "message": "Another clock request for this day was processed first, please retry",
            "retryable": true
        })),
        (status = 422, description = "Outside the geofence, missing photo or too early", body = Object, example = json!({
            "error": "geofence_violation",
            "message": "You are 412 m away from the allowed area (radius 100 m)",
            "retryable": true
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[tracing::instrument(
    skip_all,
    fields(user_id = auth.user_id, schedule_id = %payload.schedule_id)
)]
pub async fn clock(
    auth: AuthUser,
    store: web::Data<dyn AttendanceStore>,
    clock: web::Data<ServerClock>,
    payload: web::Json<ClockRequest>,
) -> Result<HttpResponse, AppError> {
    if !auth.is_student() {
        return Err(AppError::Forbidden(
            "Only students clock attendance".to_string(),
        ));
    }

    let ClockRequest {
        schedule_id,
        location,
        photo_url,
    } = payload.into_inner();

    if location.as_ref().is_some_and(|point| !point.is_valid()) {
        return Err(AppError::BadRequest(
            "location must have lat within ±90 and lng within ±180".to_string(),
        ));
    }

    let event = ClockEvent {
        at: clock.now(),
        location,
        photo_url,
    };

    let toggled = service::toggle(store.get_ref(), &schedule_id, auth.user_ref(), event)
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "Clock toggle rejected"))?;

    Ok(HttpResponse::Ok().json(ClockResponse {
        action: toggled.outcome.action,
        session_index: toggled.outcome.session_index,
        attendance: toggled.attendance,
    }))
}

/// Caller's attendance for today
#[utoipa::path(
    get,
    path = "/api/v1/attendance/today",
    params(TodayQuery),
    responses(
        (status = 200, description = "Today's record, elapsed sessions shown as absent", body = Attendance),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Scheduler not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn today(
    auth: AuthUser,
    store: web::Data<dyn AttendanceStore>,
    clock: web::Data<ServerClock>,
    query: web::Query<TodayQuery>,
) -> Result<HttpResponse, AppError> {
    let record =
        service::today(store.get_ref(), &query.schedule_id, auth.user_ref(), clock.now()).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// List attendance records
#[utoipa::path(
    get,
    path = "/api/v1/attendance",
    params(AttendanceFilter),
    responses(
        (status = 200, description = "Records ordered by date", body = AttendanceListResponse),
        (status = 400, description = "Agencies must filter by schedule_id"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn list_attendance(
    auth: AuthUser,
    store: web::Data<dyn AttendanceStore>,
    query: web::Query<AttendanceFilter>,
) -> Result<HttpResponse, AppError> {
    let mut filter = query.into_inner();

    match auth.role {
        // students only ever see their own records
        Role::Student => filter.user_id = Some(auth.user_id),
        Role::Agency => {
            let schedule_id = filter.schedule_id.as_deref().ok_or_else(|| {
                AppError::BadRequest("schedule_id is required for agencies".to_string())
            })?;
            let scheduler = load_scheduler(store.get_ref(), schedule_id).await?;
            auth.require_manager_of(&scheduler)?;
        }
        Role::Admin => {}
    }

    let page = store.query_attendance(&filter).await?;
    let (page_no, per_page) = match filter.window() {
        Some((limit, offset)) => (offset / limit + 1, limit),
        None => (1, page.data.len() as u64),
    };

    Ok(HttpResponse::Ok().json(AttendanceListResponse {
        data: page.data,
        page: page_no,
        per_page,
        total: page.total,
    }))
}

/// Progress toward contract hours
#[utoipa::path(
    get,
    path = "/api/v1/attendance/summary",
    params(SummaryQuery),
    responses(
        (status = 200, description = "Worked hours, day counts and contract progress", body = ProgressSummary),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Scheduler not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn attendance_summary(
    auth: AuthUser,
    store: web::Data<dyn AttendanceStore>,
    clock: web::Data<ServerClock>,
    query: web::Query<SummaryQuery>,
) -> Result<HttpResponse, AppError> {
    let scheduler = load_scheduler(store.get_ref(), &query.schedule_id).await?;

    let user_id = if auth.is_student() {
        match query.user_id {
            Some(id) if id != auth.user_id => {
                return Err(AppError::Forbidden(
                    "Students can only view their own summary".to_string(),
                ));
            }
            _ => auth.user_id,
        }
    } else {
        auth.require_manager_of(&scheduler)?;
        query
            .user_id
            .ok_or_else(|| AppError::BadRequest("user_id is required".to_string()))?
    };

    let summary = service::period_summary(
        store.get_ref(),
        &scheduler,
        user_id,
        query.from,
        query.to,
        clock.now(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// Get one attendance record
#[utoipa::path(
    get,
    path = "/api/v1/attendance/{id}",
    params(
        ("id" = String, Path, description = "Attendance id")
    ),
    responses(
        (status = 200, description = "Attendance record", body = Attendance),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn get_attendance(
    auth: AuthUser,
    store: web::Data<dyn AttendanceStore>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let record = load_attendance(store.get_ref(), &path).await?.doc;

    if auth.is_student() {
        if record.user.id != auth.user_id {
            return Err(AppError::Forbidden("Not your attendance".to_string()));
        }
    } else {
        let scheduler = load_scheduler(store.get_ref(), &record.schedule.id).await?;
        auth.require_manager_of(&scheduler)?;
    }

    Ok(HttpResponse::Ok().json(record))
}

/// Excuse one session
#[utoipa::path(
    put,
    path = "/api/v1/attendance/{id}/sessions/{index}/excuse",
    params(
        ("id" = String, Path, description = "Attendance id"),
        ("index" = usize, Path, description = "Session position within the day")
    ),
    request_body(
        content = ExcuseRequest,
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Session excused", body = Attendance),
        (status = 400, description = "Missing reason"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Attendance or session not found"),
        (status = 409, description = "Already excused or concurrently modified")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn excuse_session(
    auth: AuthUser,
    store: web::Data<dyn AttendanceStore>,
    clock: web::Data<ServerClock>,
    path: web::Path<(String, usize)>,
    payload: web::Json<ExcuseRequest>,
) -> Result<HttpResponse, AppError> {
    auth.require_agency_or_admin()?;
    let (attendance_id, index) = path.into_inner();

    let record = service::excuse_session(
        store.get_ref(),
        &auth,
        &attendance_id,
        index,
        &payload.reason,
        clock.now(),
    )
    .await?;

    Ok(HttpResponse::Ok().json(record))
}

/// Excuse one session of a student's day by date
#[utoipa::path(
    put,
    path = "/api/v1/attendance/excuse",
    request_body(
        content = DayExcuseRequest,
        description = "Creates the day record when the student never clocked that day",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Session excused", body = Attendance),
        (status = 400, description = "Missing reason or day tracked under another schedule"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Scheduler, planned day or session not found"),
        (status = 409, description = "Already excused or concurrently modified")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn excuse_day(
    auth: AuthUser,
    store: web::Data<dyn AttendanceStore>,
    clock: web::Data<ServerClock>,
    payload: web::Json<DayExcuseRequest>,
) -> Result<HttpResponse, AppError> {
    auth.require_agency_or_admin()?;
    let request = payload.into_inner();

    let record = service::excuse_day_session(
        store.get_ref(),
        &auth,
        DayRef {
            scheduler_id: &request.schedule_id,
            user_id: request.user_id,
            date: request.date,
        },
        request.session_index,
        &request.reason,
        clock.now(),
    )
    .await?;

    Ok(HttpResponse::Ok().json(record))
}
