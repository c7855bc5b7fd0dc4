use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{
    ActorId, AuditInstanceId, AuditTypeId, LocationId, ScheduleId, TemplateId, TenantId,
};

/// Display name recorded on audit instances created without a human auditor.
pub const SYSTEM_AUDITOR_NAME: &str = "System";
/// Role recorded on audit instances created without a human auditor.
pub const SYSTEM_AUDITOR_ROLE: &str = "Automated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    InProgress,
    Completed,
    Reviewed,
    Archived,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::InProgress => "in_progress",
            AuditStatus::Completed => "completed",
            AuditStatus::Reviewed => "reviewed",
            AuditStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(AuditStatus::InProgress),
            "completed" => Some(AuditStatus::Completed),
            "reviewed" => Some(AuditStatus::Reviewed),
            "archived" => Some(AuditStatus::Archived),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one generation cycle of one schedule.
///
/// At most one audit instance may exist per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItemKey {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub audit_type_id: AuditTypeId,
    pub schedule_id: ScheduleId,
    pub due_date: NaiveDate,
}

/// Audit instance to be inserted for a due schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAuditInstance {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub audit_type_id: AuditTypeId,
    pub audit_template_id: TemplateId,
    pub audit_schedule_id: ScheduleId,
    pub audit_date: NaiveDate,
    pub auditor_id: ActorId,
    pub auditor_name: String,
    pub auditor_role: String,
    pub status: AuditStatus,
}

impl NewAuditInstance {
    pub fn key(&self) -> WorkItemKey {
        WorkItemKey {
            tenant_id: self.tenant_id,
            location_id: self.location_id,
            audit_type_id: self.audit_type_id,
            schedule_id: self.audit_schedule_id,
            due_date: self.audit_date,
        }
    }
}

/// A persisted audit instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditInstance {
    pub id: AuditInstanceId,
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub audit_type_id: AuditTypeId,
    pub audit_template_id: TemplateId,
    pub audit_schedule_id: Option<ScheduleId>,
    pub audit_date: NaiveDate,
    pub auditor_id: ActorId,
    pub auditor_name: Option<String>,
    pub auditor_role: Option<String>,
    pub status: AuditStatus,
    pub created_at: DateTime<Utc>,
}

/// Due-date bookkeeping written back to a schedule after generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleAdvance {
    pub schedule_id: ScheduleId,
    pub last_audit_date: NaiveDate,
    pub next_audit_due: NaiveDate,
}
