//! Scheduling and execution of monitor checks.

pub mod executor;
pub mod models;
pub mod retry;
pub mod schedule;
pub mod scheduler;
pub mod shutdown;
