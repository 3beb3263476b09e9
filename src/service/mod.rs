pub mod attendance;
pub mod schedule;
