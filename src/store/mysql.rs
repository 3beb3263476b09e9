use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::MySqlPool;

use super::{AttendanceFilter, AttendancePage, AttendanceStore, StoreError, Versioned};
use crate::model::attendance::Attendance;
use crate::model::schedule::Scheduler;

/// Documents are stored as JSON text next to the indexed columns the
/// queries filter on.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

// Helper enum for typed SQLx binding
enum FilterValue<'a> {
    U64(u64),
    Str(&'a str),
    Date(NaiveDate),
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn is_duplicate_key(e: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = e {
        return db_err.code().as_deref() == Some("23000");
    }
    false
}

fn decode_attendance(row: Option<(u64, String)>) -> Result<Option<Versioned<Attendance>>, StoreError> {
    row.map(|(version, doc)| {
        Ok::<_, StoreError>(Versioned {
            version,
            doc: serde_json::from_str(&doc)?,
        })
    })
    .transpose()
}

#[async_trait]
impl AttendanceStore for MySqlStore {
    fn backend_tag(&self) -> &'static str {
        "mysql"
    }

    async fn get_scheduler(&self, id: &str) -> Result<Option<Scheduler>, StoreError> {
        let row = sqlx::query_as::<_, (String,)>("SELECT doc FROM schedulers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .map(|(doc,)| serde_json::from_str(&doc))
            .transpose()?)
    }

    async fn list_schedulers(&self, agency_id: Option<u64>) -> Result<Vec<Scheduler>, StoreError> {
        let rows = match agency_id {
            Some(agency_id) => {
                sqlx::query_as::<_, (String,)>(
                    r#"
                    SELECT doc FROM schedulers
                    WHERE owner_agency_id = ?
                    ORDER BY created_at DESC, id
                    "#,
                )
                .bind(agency_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, (String,)>(
                    "SELECT doc FROM schedulers ORDER BY created_at DESC, id",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter()
            .map(|(doc,)| serde_json::from_str(&doc).map_err(StoreError::from))
            .collect()
    }

    async fn put_scheduler(&self, scheduler: &Scheduler) -> Result<(), StoreError> {
        let doc = serde_json::to_string(scheduler)?;

        sqlx::query(
            r#"
            INSERT INTO schedulers
                (id, owner_agency_id, schedule_name, start_date, end_date, doc, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                schedule_name = VALUES(schedule_name),
                start_date = VALUES(start_date),
                end_date = VALUES(end_date),
                doc = VALUES(doc),
                updated_at = VALUES(updated_at)
            "#,
        )
        .bind(&scheduler.id)
        .bind(scheduler.owner_agency_id)
        .bind(&scheduler.schedule_name)
        .bind(scheduler.start_date)
        .bind(scheduler.end_date)
        .bind(doc)
        .bind(scheduler.created_at)
        .bind(scheduler.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_attendance(&self, id: &str) -> Result<Option<Versioned<Attendance>>, StoreError> {
        let row = sqlx::query_as::<_, (u64, String)>(
            "SELECT version, doc FROM attendance WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        decode_attendance(row)
    }

    async fn find_attendance(
        &self,
        user_id: u64,
        date: NaiveDate,
    ) -> Result<Option<Versioned<Attendance>>, StoreError> {
        let row = sqlx::query_as::<_, (u64, String)>(
            "SELECT version, doc FROM attendance WHERE user_id = ? AND work_date = ?",
        )
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        decode_attendance(row)
    }

    async fn query_attendance(&self, filter: &AttendanceFilter) -> Result<AttendancePage, StoreError> {
        let mut where_sql = String::from(" WHERE 1=1");
        let mut args: Vec<FilterValue> = Vec::new();

        if let Some(user_id) = filter.user_id {
            where_sql.push_str(" AND user_id = ?");
            args.push(FilterValue::U64(user_id));
        }
        if let Some(schedule_id) = filter.schedule_id.as_deref() {
            where_sql.push_str(" AND schedule_id = ?");
            args.push(FilterValue::Str(schedule_id));
        }
        if let Some(from) = filter.from {
            where_sql.push_str(" AND work_date >= ?");
            args.push(FilterValue::Date(from));
        }
        if let Some(to) = filter.to {
            where_sql.push_str(" AND work_date <= ?");
            args.push(FilterValue::Date(to));
        }

        let count_sql = format!("SELECT COUNT(*) FROM attendance{}", where_sql);
        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        for arg in &args {
            count_q = match arg {
                FilterValue::U64(v) => count_q.bind(*v),
                FilterValue::Str(s) => count_q.bind(*s),
                FilterValue::Date(d) => count_q.bind(*d),
            };
        }
        let total = count_q.fetch_one(&self.pool).await?;

        let mut data_sql = format!(
            "SELECT doc FROM attendance{} ORDER BY work_date, user_id",
            where_sql
        );
        let window = filter.window();
        if window.is_some() {
            data_sql.push_str(" LIMIT ? OFFSET ?");
        }

        let mut data_q = sqlx::query_as::<_, (String,)>(&data_sql);
        for arg in args {
            data_q = match arg {
                FilterValue::U64(v) => data_q.bind(v),
                FilterValue::Str(s) => data_q.bind(s),
                FilterValue::Date(d) => data_q.bind(d),
            };
        }
        if let Some((limit, offset)) = window {
            data_q = data_q.bind(limit).bind(offset);
        }

        let data = data_q
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|(doc,)| serde_json::from_str(&doc))
            .collect::<Result<Vec<Attendance>, _>>()?;

        Ok(AttendancePage { data, total })
    }

    async fn put_attendance(
        &self,
        record: &Attendance,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let doc = serde_json::to_string(record)?;

        match expected_version {
            None => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO attendance
                        (id, user_id, schedule_id, work_date, overall_status,
                         total_work_minutes, version, doc, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?, ?)
                    "#,
                )
                .bind(&record.id)
                .bind(record.user.id)
                .bind(&record.schedule.id)
                .bind(record.date())
                .bind(record.overall_status.to_string())
                .bind(record.total_work_minutes)
                .bind(doc)
                .bind(record.created_at)
                .bind(record.updated_at)
                .execute(&self.pool)
                .await;

                match result {
                    Ok(_) => Ok(1),
                    // unique (user_id, work_date) or primary key already taken
                    Err(e) if is_duplicate_key(&e) => Err(StoreError::Conflict(record.id.clone())),
                    Err(e) => Err(e.into()),
                }
            }
            Some(expected) => {
                let result = sqlx::query(
                    r#"
                    UPDATE attendance
                    SET overall_status = ?,
                        total_work_minutes = ?,
                        doc = ?,
                        updated_at = ?,
                        version = version + 1
                    WHERE id = ?
                    AND version = ?
                    "#,
                )
                .bind(record.overall_status.to_string())
                .bind(record.total_work_minutes)
                .bind(doc)
                .bind(record.updated_at)
                .bind(&record.id)
                .bind(expected)
                .execute(&self.pool)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(StoreError::Conflict(record.id.clone()));
                }

                Ok(expected + 1)
            }
        }
    }
}
