//! Per-schedule error taxonomy for the runner.

use cadence_core::{AuditTypeId, ScheduleId};
use cadence_notify::NotifyError;
use chrono::NaiveDate;

use crate::store::StoreError;

/// Why a single schedule could not be processed.
///
/// These are caught at the loop boundary: one failing schedule never
/// aborts the pass.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("audit type {audit_type_id} not found for schedule {schedule_id}")]
    MissingAuditType {
        schedule_id: ScheduleId,
        audit_type_id: AuditTypeId,
    },

    #[error("no template for audit type {audit_type_id} (schedule {schedule_id})")]
    MissingTemplate {
        schedule_id: ScheduleId,
        audit_type_id: AuditTypeId,
    },

    #[error("no next due date after {after} for schedule {schedule_id}")]
    Recurrence {
        schedule_id: ScheduleId,
        after: NaiveDate,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("notification failed: {0}")]
    Notify(#[from] NotifyError),
}

/// Errors loading message template overrides.
#[derive(Debug, thiserror::Error)]
pub enum TemplateFileError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid template file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("template `{name}` does not compile: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: NotifyError,
    },
}
