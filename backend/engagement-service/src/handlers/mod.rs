pub mod cron;
pub mod health;

pub use cron::CronState;
pub use health::HealthState;
