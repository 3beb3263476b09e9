use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;
use utoipa::IntoParams;

use crate::model::attendance::Attendance;
use crate::model::schedule::Scheduler;

#[cfg(test)]
pub mod memory;
pub mod mysql;

#[cfg(test)]
pub use memory::MemoryStore;
pub use mysql::MySqlStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compare-and-swap lost: the document changed (or appeared) since it was read.
    #[error("Version conflict on {0}")]
    Conflict(String),
}

/// A document together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: u64,
    pub doc: T,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct AttendanceFilter {
    /// Only records of this user
    pub user_id: Option<u64>,
    /// Only records of this scheduler
    pub schedule_id: Option<String>,
    /// First day (inclusive)
    #[param(value_type = Option<String>, example = "2026-01-05")]
    pub from: Option<NaiveDate>,
    /// Last day (inclusive)
    #[param(value_type = Option<String>, example = "2026-01-30")]
    pub to: Option<NaiveDate>,
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    /// Items per page
    pub per_page: Option<u64>,
}

impl AttendanceFilter {
    pub fn for_user(user_id: u64, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self {
            user_id: Some(user_id),
            from,
            to,
            ..Default::default()
        }
    }

    /// `(limit, offset)` when the caller asked for a page.
    pub fn window(&self) -> Option<(u64, u64)> {
        if self.page.is_none() && self.per_page.is_none() {
            return None;
        }
        let per_page = self.per_page.unwrap_or(10).clamp(1, 100);
        let page = self.page.unwrap_or(1).max(1);
        Some((per_page, (page - 1).saturating_mul(per_page)))
    }
}

/// Records ordered by date, plus the unpaginated match count.
#[derive(Debug, Clone, Default)]
pub struct AttendancePage {
    pub data: Vec<Attendance>,
    pub total: i64,
}

/// Document store behind schedules and attendance.
///
/// Schedulers use plain last-write-wins writes. Attendance writes are
/// compare-and-swap: `expected_version = None` only succeeds when no record
/// exists for the same id or the same (user, date); `Some(v)` only succeeds
/// while the stored version is still `v`. Losing either race yields
/// [`StoreError::Conflict`] and leaves the stored record unchanged.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    async fn get_scheduler(&self, id: &str) -> Result<Option<Scheduler>, StoreError>;

    async fn list_schedulers(&self, agency_id: Option<u64>) -> Result<Vec<Scheduler>, StoreError>;

    async fn put_scheduler(&self, scheduler: &Scheduler) -> Result<(), StoreError>;

    async fn get_attendance(&self, id: &str) -> Result<Option<Versioned<Attendance>>, StoreError>;

    async fn find_attendance(
        &self,
        user_id: u64,
        date: NaiveDate,
    ) -> Result<Option<Versioned<Attendance>>, StoreError>;

    async fn query_attendance(&self, filter: &AttendanceFilter) -> Result<AttendancePage, StoreError>;

    /// Returns the new version on success.
    async fn put_attendance(
        &self,
        record: &Attendance,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError>;
}
