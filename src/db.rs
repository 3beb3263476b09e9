use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;

pub async fn init_db(database_url: &str) -> Result<MySqlPool, sqlx::Error> {
    MySqlPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Creates the document tables when they are missing.
///
/// `UNIQUE (user_id, work_date)` is what turns two concurrent first clock-ins
/// for the same day into a duplicate-key error on the slower insert.
pub async fn ensure_schema(pool: &MySqlPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schedulers (
            id VARCHAR(36) NOT NULL PRIMARY KEY,
            owner_agency_id BIGINT UNSIGNED NOT NULL,
            schedule_name VARCHAR(255) NOT NULL,
            start_date DATE NOT NULL,
            end_date DATE NOT NULL,
            doc LONGTEXT NOT NULL,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            INDEX idx_schedulers_agency (owner_agency_id, created_at)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attendance (
            id VARCHAR(36) NOT NULL PRIMARY KEY,
            user_id BIGINT UNSIGNED NOT NULL,
            schedule_id VARCHAR(36) NOT NULL,
            work_date DATE NOT NULL,
            overall_status VARCHAR(16) NOT NULL,
            total_work_minutes BIGINT NOT NULL DEFAULT 0,
            version BIGINT UNSIGNED NOT NULL DEFAULT 1,
            doc LONGTEXT NOT NULL,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            UNIQUE KEY uq_attendance_user_day (user_id, work_date),
            INDEX idx_attendance_schedule (schedule_id, work_date)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
