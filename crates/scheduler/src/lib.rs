//! Recurring compliance-audit scheduler.
//!
//! This crate provides:
//! - Recurrence calculation from a frequency rule to the next due date
//! - The `ScheduleStore` seam with PostgreSQL and in-memory implementations
//! - `ScheduleRunner`: idempotent audit generation and reminder passes
//! - Minijinja message templates for owner notifications
//! - A cron dispatch plan driving the `audit-automation` daemon

pub mod db;
pub mod dispatch;
pub mod error;
pub mod messages;
pub mod recurrence;
pub mod runner;
pub mod store;

pub use error::ScheduleError;
pub use recurrence::next_due_date;
pub use runner::{AutomationReport, PassOutcome, RunnerConfig, ScheduleRunner};
pub use store::{ScheduleContext, ScheduleStore, StoreError};
