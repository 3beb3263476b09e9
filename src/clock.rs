use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{Local, NaiveDateTime, TimeDelta};
use sqlx::MySqlPool;

/// Wall-clock time corrected by an offset learned from the database server.
///
/// Every threshold comparison in the service reads time from here, never
/// from the client.
#[derive(Debug, Default)]
pub struct ServerClock {
    offset_ms: AtomicI64,
}

impl ServerClock {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_offset_ms(offset_ms: i64) -> Self {
        Self {
            offset_ms: AtomicI64::new(offset_ms),
        }
    }

    /// Clock whose `now()` starts at `at` and advances in real time.
    #[cfg(test)]
    pub fn starting_at(at: NaiveDateTime) -> Self {
        Self::with_offset_ms((at - Local::now().naive_local()).num_milliseconds())
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::Relaxed)
    }

    pub fn set_offset_ms(&self, offset_ms: i64) {
        self.offset_ms.store(offset_ms, Ordering::Relaxed);
    }

    pub fn now(&self) -> NaiveDateTime {
        self.at(Local::now().naive_local())
    }

    /// `local` shifted by the current offset.
    pub fn at(&self, local: NaiveDateTime) -> NaiveDateTime {
        local + TimeDelta::milliseconds(self.offset_ms())
    }

    /// Learns the offset from a server reading taken at `local`.
    pub fn adjust(&self, server: NaiveDateTime, local: NaiveDateTime) -> i64 {
        let offset = (server - local).num_milliseconds();
        self.set_offset_ms(offset);
        offset
    }

    pub async fn sync(&self, pool: &MySqlPool) -> Result<i64, sqlx::Error> {
        let server: NaiveDateTime = sqlx::query_scalar("SELECT NOW(3)")
            .fetch_one(pool)
            .await?;
        Ok(self.adjust(server, Local::now().naive_local()))
    }
}

/// Re-syncs `clock` every `every` for the lifetime of the server.
pub fn spawn_sync_task(clock: actix_web::web::Data<ServerClock>, pool: MySqlPool, every: Duration) {
    actix_web::rt::spawn(async move {
        let mut ticker = actix_web::rt::time::interval(every);
        loop {
            ticker.tick().await;
            match clock.sync(&pool).await {
                Ok(offset_ms) => tracing::debug!(offset_ms, "Server clock synchronized"),
                Err(e) => tracing::warn!(error = %e, "Server clock sync failed, keeping last offset"),
            }
        }
    });
}
