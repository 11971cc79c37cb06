pub mod delivery_attempts;
pub mod delivery_jobs;
pub mod destinations;
pub mod flows;
pub mod webhook_logs;
