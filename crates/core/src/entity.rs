use serde::{Deserialize, Serialize};

pub type TenantId = i64;
pub type LocationId = i64;
pub type AuditTypeId = i64;
pub type TemplateId = i64;
pub type ScheduleId = i64;
pub type AuditInstanceId = i64;

/// Reference to the user (or automation) an audit instance is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub i64);

impl ActorId {
    /// Well-known actor used when work is generated without a human owner.
    pub const SYSTEM: ActorId = ActorId(1);

    pub fn get(self) -> i64 {
        self.0
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::SYSTEM
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Organizational boundary owning locations and schedules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
}

/// A site within a tenant where audits are performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub tenant_id: TenantId,
    pub name: String,
}

/// Kind of compliance audit (e.g. "Medication Audit").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditType {
    pub id: AuditTypeId,
    pub name: String,
    pub is_active: bool,
}

/// Question set used to carry out an audit of a given type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTemplate {
    pub id: TemplateId,
    pub audit_type_id: AuditTypeId,
    pub name: String,
    pub version: String,
    pub is_active: bool,
}
