use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use chrono::NaiveDateTime;
use serde_json::json;
use strum_macros::Display;
use thiserror::Error;

use crate::store::StoreError;

/// Which clock event a missing photo belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ProofKind {
    #[strum(serialize = "clock in")]
    ClockIn,
    #[strum(serialize = "clock out")]
    ClockOut,
}

/// Rejections produced by the schedule and attendance engine.
///
/// Every variant is a deterministic function of the inputs that produced it;
/// a rejected event never leaves a session half-updated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttendanceError {
    #[error("{}", geofence_message(.distance_m, .radius_m))]
    GeofenceViolation {
        distance_m: Option<f64>,
        radius_m: f64,
    },

    #[error("A photo is required to {kind}")]
    MissingProof { kind: ProofKind },

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Another clock request for this day was processed first, please retry")]
    ConcurrencyConflict,

    #[error("Clock event at {at} is earlier than the last recorded event at {last}")]
    StaleClock {
        at: NaiveDateTime,
        last: NaiveDateTime,
    },

    #[error("Clock-in opens at {opens_at}")]
    ClockInTooEarly { opens_at: NaiveDateTime },

    #[error("Session is closed and no longer accepts clock events")]
    SessionClosed,

    #[error("No session is left to clock into today")]
    NoOpenSession,

    #[error("Session is already excused")]
    AlreadyExcused,
}

fn geofence_message(distance_m: &Option<f64>, radius_m: &f64) -> String {
    match distance_m {
        Some(d) => format!(
            "You are {:.0} m away from the allowed area (radius {:.0} m)",
            d, radius_m
        ),
        None => "Your location is required to clock this session".to_string(),
    }
}

impl AttendanceError {
    /// Stable machine-readable error code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceError::GeofenceViolation { .. } => "geofence_violation",
            AttendanceError::MissingProof { .. } => "missing_proof",
            AttendanceError::InvalidSchedule(_) => "invalid_schedule",
            AttendanceError::ConcurrencyConflict => "concurrency_conflict",
            AttendanceError::StaleClock { .. } => "stale_clock",
            AttendanceError::ClockInTooEarly { .. } => "clock_in_too_early",
            AttendanceError::SessionClosed => "session_closed",
            AttendanceError::NoOpenSession => "no_open_session",
            AttendanceError::AlreadyExcused => "already_excused",
        }
    }

    /// Whether the same request may succeed if the user simply tries again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AttendanceError::GeofenceViolation { .. }
                | AttendanceError::MissingProof { .. }
                | AttendanceError::ConcurrencyConflict
                | AttendanceError::ClockInTooEarly { .. }
        )
    }

    fn status(&self) -> StatusCode {
        match self {
            AttendanceError::GeofenceViolation { .. }
            | AttendanceError::MissingProof { .. }
            | AttendanceError::ClockInTooEarly { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AttendanceError::InvalidSchedule(_) => StatusCode::BAD_REQUEST,
            AttendanceError::ConcurrencyConflict
            | AttendanceError::StaleClock { .. }
            | AttendanceError::SessionClosed
            | AttendanceError::NoOpenSession
            | AttendanceError::AlreadyExcused => StatusCode::CONFLICT,
        }
    }
}

/// Errors surfaced by HTTP handlers.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Attendance(#[from] AttendanceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Attendance(e) => e.status(),
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::Attendance(e) => json!({
                "error": e.code(),
                "message": e.to_string(),
                "retryable": e.is_retryable(),
            }),
            AppError::Store(e) => {
                tracing::error!(error = %e, "Store operation failed");
                json!({
                    "error": "internal",
                    "message": "Internal Server Error",
                    "retryable": true,
                })
            }
            AppError::NotFound(_) => json!({
                "error": "not_found",
                "message": self.to_string(),
                "retryable": false,
            }),
            AppError::Forbidden(_) => json!({
                "error": "forbidden",
                "message": self.to_string(),
                "retryable": false,
            }),
            AppError::BadRequest(_) => json!({
                "error": "bad_request",
                "message": self.to_string(),
                "retryable": false,
            }),
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}
