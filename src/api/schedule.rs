use crate::auth::auth::AuthUser;
use crate::clock::ServerClock;
use crate::engine::schedule_aggregator::ScheduleSummary;
use crate::error::AppError;
use crate::model::role::Role;
use crate::model::schedule::Scheduler;
use crate::service::attendance::load_scheduler;
use crate::service::schedule::{CreateScheduler, create_scheduler};
use crate::store::AttendanceStore;
use crate::utils::schedule_cache;
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Deserialize, IntoParams)]
pub struct ScheduleQuery {
    /// Filter by owning agency (agencies always see their own)
    pub agency_id: Option<u64>,
}

/* =========================
Create scheduler
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/schedules",
    request_body(
        content = CreateScheduler,
        description = "Weekly template and contract range",
        content_type = "application/json"
    ),
    responses(
        (status = 201, description = "Scheduler created", body = Scheduler),
        (status = 400, description = "Invalid schedule", body = Object, example = json!({
            "error": "invalid_schedule",
            "message": "Invalid schedule: monday: session start 17:00:00 is not before end 09:00:00",
            "retryable": false
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Schedule"
)]
pub async fn create_schedule(
    auth: AuthUser,
    store: web::Data<dyn AttendanceStore>,
    clock: web::Data<ServerClock>,
    payload: web::Json<CreateScheduler>,
) -> Result<HttpResponse, AppError> {
    let scheduler =
        create_scheduler(store.get_ref(), &auth, payload.into_inner(), clock.now()).await?;
    Ok(HttpResponse::Created().json(scheduler))
}

/* =========================
List schedulers
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/schedules",
    params(ScheduleQuery),
    responses(
        (status = 200, description = "Schedulers, newest first", body = Vec<Scheduler>),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Schedule"
)]
pub async fn list_schedules(
    auth: AuthUser,
    store: web::Data<dyn AttendanceStore>,
    query: web::Query<ScheduleQuery>,
) -> Result<HttpResponse, AppError> {
    let agency_id = match auth.role {
        Role::Agency => auth.agency_id,
        _ => query.agency_id,
    };

    let schedulers = store.list_schedulers(agency_id).await?;
    Ok(HttpResponse::Ok().json(schedulers))
}

/* =========================
Get scheduler
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/schedules/{id}",
    params(
        ("id" = String, Path, description = "Scheduler id")
    ),
    responses(
        (status = 200, description = "Scheduler", body = Scheduler),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Schedule"
)]
pub async fn get_schedule(
    _auth: AuthUser,
    store: web::Data<dyn AttendanceStore>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let scheduler = load_scheduler(store.get_ref(), &path).await?;
    Ok(HttpResponse::Ok().json(scheduler))
}

/* =========================
Scheduler hour totals
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/schedules/{id}/summary",
    params(
        ("id" = String, Path, description = "Scheduler id")
    ),
    responses(
        (status = 200, description = "Weekly hours, contract hours and working days", body = ScheduleSummary),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Schedule"
)]
pub async fn schedule_summary(
    _auth: AuthUser,
    store: web::Data<dyn AttendanceStore>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let scheduler = load_scheduler(store.get_ref(), &path).await?;
    let summary = schedule_cache::summary_for(&scheduler).await;
    Ok(HttpResponse::Ok().json(summary))
}
