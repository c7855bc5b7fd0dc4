//! Persistence seam for the schedule runner.
//!
//! [`ScheduleStore`] is implemented by [`PgScheduleStore`] for production
//! and [`MemoryStore`] for tests and local replay.

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::PgScheduleStore;

use async_trait::async_trait;
use chrono::NaiveDate;

use cadence_core::{
    AuditInstance, AuditSchedule, AuditTemplate, AuditType, AuditTypeId, Location, LocationId,
    NewAuditInstance, ScheduleAdvance, ScheduleId, Tenant, TenantId, WorkItemKey,
};

/// Errors from schedule store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("audit instance already exists for schedule {} on {}", .0.schedule_id, .0.due_date)]
    Duplicate(WorkItemKey),
}

/// An active schedule joined with the records a reminder needs.
///
/// Any of the joined records may be missing when the schedule references
/// a deleted row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleContext {
    pub schedule: AuditSchedule,
    pub audit_type: Option<AuditType>,
    pub location: Option<Location>,
    pub tenant: Option<Tenant>,
}

impl ScheduleContext {
    /// Name of the first missing reference, if any.
    pub fn missing_reference(&self) -> Option<&'static str> {
        if self.audit_type.is_none() {
            Some("audit type")
        } else if self.location.is_none() {
            Some("location")
        } else if self.tenant.is_none() {
            Some("tenant")
        } else {
            None
        }
    }
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// All schedules with `is_active = true`, ordered by id.
    async fn active_schedules(&self) -> Result<Vec<AuditSchedule>, StoreError>;

    /// Active schedules with their audit type, location and tenant.
    async fn active_schedules_with_context(&self) -> Result<Vec<ScheduleContext>, StoreError> {
        let schedules = self.active_schedules().await?;
        let mut out = Vec::with_capacity(schedules.len());
        for schedule in schedules {
            let audit_type = self.audit_type(schedule.audit_type_id).await?;
            let location = self.location(schedule.location_id).await?;
            let tenant = self.tenant(schedule.tenant_id).await?;
            out.push(ScheduleContext {
                schedule,
                audit_type,
                location,
                tenant,
            });
        }
        Ok(out)
    }

    async fn audit_type(&self, id: AuditTypeId) -> Result<Option<AuditType>, StoreError>;

    /// The template used for generated work, preferring active templates.
    async fn template_for_audit_type(
        &self,
        audit_type_id: AuditTypeId,
    ) -> Result<Option<AuditTemplate>, StoreError>;

    async fn location(&self, id: LocationId) -> Result<Option<Location>, StoreError>;

    async fn tenant(&self, id: TenantId) -> Result<Option<Tenant>, StoreError>;

    async fn audit_instance_exists(&self, key: &WorkItemKey) -> Result<bool, StoreError>;

    /// Insert a work item. A second insert for the same key fails with
    /// [`StoreError::Duplicate`].
    async fn insert_audit_instance(
        &self,
        item: &NewAuditInstance,
    ) -> Result<AuditInstance, StoreError>;

    async fn advance_schedule(&self, advance: &ScheduleAdvance) -> Result<(), StoreError>;

    /// Insert the work item and advance its schedule as one unit.
    ///
    /// The default runs the two steps back to back; implementations with
    /// transactions should override it.
    async fn record_generation(
        &self,
        item: &NewAuditInstance,
        advance: &ScheduleAdvance,
    ) -> Result<AuditInstance, StoreError> {
        let instance = self.insert_audit_instance(item).await?;
        self.advance_schedule(advance).await?;
        Ok(instance)
    }

    async fn mark_reminder_sent(
        &self,
        schedule_id: ScheduleId,
        on: NaiveDate,
    ) -> Result<(), StoreError>;
}
