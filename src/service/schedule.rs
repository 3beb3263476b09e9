use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::auth::AuthUser;
use crate::engine::geofence::Geofence;
use crate::error::AppError;
use crate::model::role::Role;
use crate::model::schedule::{DaySchedule, Scheduler};
use crate::store::AttendanceStore;
use crate::utils::schedule_cache;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateScheduler {
    #[schema(example = "BSIT Practicum 2026")]
    pub schedule_name: String,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-04-30", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    pub weekly_schedule: Vec<DaySchedule>,
    pub geofence: Option<Geofence>,
    #[serde(default)]
    #[schema(example = 30)]
    pub early_clock_in_mins: u32,
    /// Required for admins; agencies always author for themselves
    #[schema(example = 12)]
    pub owner_agency_id: Option<u64>,
}

/// Validates and stores a new scheduler owned by the caller's agency.
pub async fn create_scheduler(
    store: &dyn AttendanceStore,
    actor: &AuthUser,
    input: CreateScheduler,
    now: NaiveDateTime,
) -> Result<Scheduler, AppError> {
    actor.require_agency_or_admin()?;

    let owner_agency_id = match actor.role {
        Role::Agency => actor
            .agency_id
            .ok_or_else(|| AppError::Forbidden("No agency profile".to_string()))?,
        _ => input
            .owner_agency_id
            .ok_or_else(|| AppError::BadRequest("owner_agency_id is required".to_string()))?,
    };

    let scheduler = Scheduler {
        id: Uuid::new_v4().to_string(),
        owner_agency_id,
        schedule_name: input.schedule_name.trim().to_string(),
        start_date: input.start_date,
        end_date: input.end_date,
        weekly_schedule: input.weekly_schedule,
        geofence: input.geofence,
        early_clock_in_mins: input.early_clock_in_mins,
        created_at: now,
        updated_at: now,
    };
    scheduler.validate()?;

    store.put_scheduler(&scheduler).await?;
    schedule_cache::invalidate(&scheduler.id).await;

    tracing::info!(
        schedule_id = %scheduler.id,
        agency_id = owner_agency_id,
        "Scheduler created"
    );
    Ok(scheduler)
}
