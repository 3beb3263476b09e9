pub mod classifier;
pub mod day_aggregator;
pub mod geofence;
pub mod schedule_aggregator;
