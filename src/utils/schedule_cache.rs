use moka::future::Cache;
use once_cell::sync::OnceCell;
use std::time::Duration;

use crate::engine::schedule_aggregator::{ScheduleSummary, summarize};
use crate::model::schedule::Scheduler;

const DEFAULT_TTL_SECS: u64 = 3600;

/// scheduler id => aggregate hours and working days
static SUMMARY_CACHE: OnceCell<Cache<String, ScheduleSummary>> = OnceCell::new();

fn build(ttl: Duration) -> Cache<String, ScheduleSummary> {
    Cache::builder()
        .max_capacity(10_000)
        .time_to_live(ttl)
        .build()
}

fn cache() -> &'static Cache<String, ScheduleSummary> {
    SUMMARY_CACHE.get_or_init(|| build(Duration::from_secs(DEFAULT_TTL_SECS)))
}

/// Sets the entry TTL. Only the first call before any lookup has effect.
pub fn init(ttl: Duration) {
    if SUMMARY_CACHE.set(build(ttl)).is_err() {
        tracing::warn!("Schedule summary cache already initialized");
    }
}

/// Cached aggregates for `scheduler`, computed on a miss.
pub async fn summary_for(scheduler: &Scheduler) -> ScheduleSummary {
    cache()
        .get_with(scheduler.id.clone(), async { summarize(scheduler) })
        .await
}

/// Drop the cached aggregates after the scheduler changed
pub async fn invalidate(scheduler_id: &str) {
    cache().invalidate(scheduler_id).await;
}
