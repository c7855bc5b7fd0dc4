//! PostgreSQL implementation of [`ScheduleStore`].
//!
//! Runtime-checked queries over the tables created by the embedded
//! migrations. Work-item insertion and schedule advancement share one
//! transaction, and the unique index on `(audit_schedule_id, audit_date)`
//! surfaces as [`StoreError::Duplicate`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::error;

use cadence_core::{
    ActorId, AuditInstance, AuditSchedule, AuditStatus, AuditTemplate, AuditType, AuditTypeId,
    Frequency, Location, LocationId, NewAuditInstance, RecurrenceRule, ScheduleAdvance,
    ScheduleId, Tenant, TenantId, WorkItemKey,
};

use super::{ScheduleContext, ScheduleStore, StoreError};

const SCHEDULE_COLUMNS: &str = "s.id, s.tenant_id, s.location_id, s.audit_type_id, s.frequency,
     s.day_of_month, s.month_of_year, s.day_of_week, s.is_active, s.next_audit_due,
     s.last_audit_date, s.email_reminder_days, s.last_reminder_sent, s.created_by_id";

const INSTANCE_COLUMNS: &str = "id, tenant_id, location_id, audit_type_id, audit_template_id,
     audit_schedule_id, audit_date, auditor_id, auditor_name, auditor_role, status, created_at";

// ── Row types ────────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct ScheduleRow {
    id: i64,
    tenant_id: i64,
    location_id: i64,
    audit_type_id: i64,
    frequency: String,
    day_of_month: Option<i32>,
    month_of_year: Option<i32>,
    day_of_week: Option<i32>,
    is_active: bool,
    next_audit_due: Option<NaiveDate>,
    last_audit_date: Option<NaiveDate>,
    email_reminder_days: Option<i32>,
    last_reminder_sent: Option<NaiveDate>,
    created_by_id: Option<i64>,
}

/// Negative anchors cannot be valid; treat them as unset.
fn anchor(value: Option<i32>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

impl From<ScheduleRow> for AuditSchedule {
    fn from(row: ScheduleRow) -> Self {
        AuditSchedule {
            id: row.id,
            tenant_id: row.tenant_id,
            location_id: row.location_id,
            audit_type_id: row.audit_type_id,
            rule: RecurrenceRule {
                frequency: Frequency::from(row.frequency),
                day_of_month: anchor(row.day_of_month),
                month_of_year: anchor(row.month_of_year),
                day_of_week: anchor(row.day_of_week),
            },
            is_active: row.is_active,
            next_audit_due: row.next_audit_due,
            last_audit_date: row.last_audit_date,
            email_reminder_days: row.email_reminder_days,
            last_reminder_sent: row.last_reminder_sent,
            created_by_id: row.created_by_id.map(ActorId),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ScheduleContextRow {
    #[sqlx(flatten)]
    schedule: ScheduleRow,
    type_id: Option<i64>,
    type_name: Option<String>,
    type_is_active: Option<bool>,
    loc_id: Option<i64>,
    loc_tenant_id: Option<i64>,
    loc_name: Option<String>,
    tenant_row_id: Option<i64>,
    tenant_name: Option<String>,
}

impl From<ScheduleContextRow> for ScheduleContext {
    fn from(row: ScheduleContextRow) -> Self {
        let audit_type = match (row.type_id, row.type_name) {
            (Some(id), Some(name)) => Some(AuditType {
                id,
                name,
                is_active: row.type_is_active.unwrap_or(true),
            }),
            _ => None,
        };
        let location = match (row.loc_id, row.loc_tenant_id, row.loc_name) {
            (Some(id), Some(tenant_id), Some(name)) => Some(Location { id, tenant_id, name }),
            _ => None,
        };
        let tenant = match (row.tenant_row_id, row.tenant_name) {
            (Some(id), Some(name)) => Some(Tenant { id, name }),
            _ => None,
        };
        ScheduleContext {
            schedule: row.schedule.into(),
            audit_type,
            location,
            tenant,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AuditTypeRow {
    id: i64,
    name: String,
    is_active: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct TemplateRow {
    id: i64,
    audit_type_id: i64,
    name: String,
    version: String,
    is_active: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct LocationRow {
    id: i64,
    tenant_id: i64,
    name: String,
}

#[derive(Debug, sqlx::FromRow)]
struct TenantRow {
    id: i64,
    name: String,
}

#[derive(Debug, sqlx::FromRow)]
struct AuditInstanceRow {
    id: i64,
    tenant_id: i64,
    location_id: i64,
    audit_type_id: i64,
    audit_template_id: i64,
    audit_schedule_id: Option<i64>,
    audit_date: NaiveDate,
    auditor_id: i64,
    auditor_name: Option<String>,
    auditor_role: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditInstanceRow> for AuditInstance {
    type Error = StoreError;

    fn try_from(row: AuditInstanceRow) -> Result<Self, Self::Error> {
        let status = AuditStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Database(sqlx::Error::Decode(
                format!("unknown audit status '{}'", row.status).into(),
            ))
        })?;
        Ok(AuditInstance {
            id: row.id,
            tenant_id: row.tenant_id,
            location_id: row.location_id,
            audit_type_id: row.audit_type_id,
            audit_template_id: row.audit_template_id,
            audit_schedule_id: row.audit_schedule_id,
            audit_date: row.audit_date,
            auditor_id: ActorId(row.auditor_id),
            auditor_name: row.auditor_name,
            auditor_role: row.auditor_role,
            status,
            created_at: row.created_at,
        })
    }
}

fn map_unique_violation(e: sqlx::Error, key: WorkItemKey) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::Duplicate(key);
        }
    }
    error!(schedule_id = key.schedule_id, error = %e, "audit instance insert failed");
    StoreError::Database(e)
}

// ── Store ────────────────────────────────────────────────────────────

/// [`ScheduleStore`] over a shared PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgScheduleStore {
    pool: PgPool,
}

impl PgScheduleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_in<'e, E>(executor: E, item: &NewAuditInstance) -> Result<AuditInstance, StoreError>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "INSERT INTO audit_instances (tenant_id, location_id, audit_type_id, audit_template_id,
                 audit_schedule_id, audit_date, auditor_id, auditor_name, auditor_role, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {INSTANCE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AuditInstanceRow>(&sql)
            .bind(item.tenant_id)
            .bind(item.location_id)
            .bind(item.audit_type_id)
            .bind(item.audit_template_id)
            .bind(item.audit_schedule_id)
            .bind(item.audit_date)
            .bind(item.auditor_id.get())
            .bind(&item.auditor_name)
            .bind(&item.auditor_role)
            .bind(item.status.as_str())
            .fetch_one(executor)
            .await
            .map_err(|e| map_unique_violation(e, item.key()))?;
        row.try_into()
    }

    async fn advance_in<'e, E>(executor: E, advance: &ScheduleAdvance) -> Result<(), StoreError>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            "UPDATE audit_schedules
             SET last_audit_date = $2, next_audit_due = $3, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(advance.schedule_id)
        .bind(advance.last_audit_date)
        .bind(advance.next_audit_due)
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "audit schedule",
                id: advance.schedule_id,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for PgScheduleStore {
    async fn active_schedules(&self) -> Result<Vec<AuditSchedule>, StoreError> {
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM audit_schedules s WHERE s.is_active = TRUE ORDER BY s.id"
        );
        let rows = sqlx::query_as::<_, ScheduleRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(AuditSchedule::from).collect())
    }

    async fn active_schedules_with_context(&self) -> Result<Vec<ScheduleContext>, StoreError> {
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS},
                    t.id AS type_id, t.name AS type_name, t.is_active AS type_is_active,
                    l.id AS loc_id, l.tenant_id AS loc_tenant_id, l.name AS loc_name,
                    tn.id AS tenant_row_id, tn.name AS tenant_name
             FROM audit_schedules s
             LEFT JOIN audit_types t ON t.id = s.audit_type_id
             LEFT JOIN locations l ON l.id = s.location_id
             LEFT JOIN tenants tn ON tn.id = s.tenant_id
             WHERE s.is_active = TRUE
             ORDER BY s.id"
        );
        let rows = sqlx::query_as::<_, ScheduleContextRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(ScheduleContext::from).collect())
    }

    async fn audit_type(&self, id: AuditTypeId) -> Result<Option<AuditType>, StoreError> {
        let row = sqlx::query_as::<_, AuditTypeRow>(
            "SELECT id, name, is_active FROM audit_types WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| AuditType {
            id: r.id,
            name: r.name,
            is_active: r.is_active,
        }))
    }

    async fn template_for_audit_type(
        &self,
        audit_type_id: AuditTypeId,
    ) -> Result<Option<AuditTemplate>, StoreError> {
        let row = sqlx::query_as::<_, TemplateRow>(
            "SELECT id, audit_type_id, name, version, is_active
             FROM audit_templates
             WHERE audit_type_id = $1
             ORDER BY is_active DESC, id
             LIMIT 1",
        )
        .bind(audit_type_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| AuditTemplate {
            id: r.id,
            audit_type_id: r.audit_type_id,
            name: r.name,
            version: r.version,
            is_active: r.is_active,
        }))
    }

    async fn location(&self, id: LocationId) -> Result<Option<Location>, StoreError> {
        let row = sqlx::query_as::<_, LocationRow>(
            "SELECT id, tenant_id, name FROM locations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Location {
            id: r.id,
            tenant_id: r.tenant_id,
            name: r.name,
        }))
    }

    async fn tenant(&self, id: TenantId) -> Result<Option<Tenant>, StoreError> {
        let row = sqlx::query_as::<_, TenantRow>("SELECT id, name FROM tenants WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Tenant { id: r.id, name: r.name }))
    }

    async fn audit_instance_exists(&self, key: &WorkItemKey) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM audit_instances
                 WHERE tenant_id = $1 AND location_id = $2 AND audit_type_id = $3
                   AND audit_schedule_id = $4 AND audit_date = $5
             )",
        )
        .bind(key.tenant_id)
        .bind(key.location_id)
        .bind(key.audit_type_id)
        .bind(key.schedule_id)
        .bind(key.due_date)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn insert_audit_instance(
        &self,
        item: &NewAuditInstance,
    ) -> Result<AuditInstance, StoreError> {
        Self::insert_in(&self.pool, item).await
    }

    async fn advance_schedule(&self, advance: &ScheduleAdvance) -> Result<(), StoreError> {
        Self::advance_in(&self.pool, advance).await
    }

    async fn record_generation(
        &self,
        item: &NewAuditInstance,
        advance: &ScheduleAdvance,
    ) -> Result<AuditInstance, StoreError> {
        let mut tx: Transaction<'_, Postgres> = self.pool.begin().await?;
        let instance = Self::insert_in(&mut *tx, item).await?;
        Self::advance_in(&mut *tx, advance).await?;
        tx.commit().await?;
        Ok(instance)
    }

    async fn mark_reminder_sent(
        &self,
        schedule_id: ScheduleId,
        on: NaiveDate,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE audit_schedules SET last_reminder_sent = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(schedule_id)
        .bind(on)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "audit schedule",
                id: schedule_id,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(frequency: &str) -> ScheduleRow {
        ScheduleRow {
            id: 7,
            tenant_id: 1,
            location_id: 2,
            audit_type_id: 3,
            frequency: frequency.to_string(),
            day_of_month: Some(15),
            month_of_year: None,
            day_of_week: Some(-1),
            is_active: true,
            next_audit_due: NaiveDate::from_ymd_opt(2025, 3, 15),
            last_audit_date: None,
            email_reminder_days: Some(3),
            last_reminder_sent: None,
            created_by_id: Some(42),
        }
    }

    #[test]
    fn schedule_row_maps_rule_and_actor() {
        let schedule = AuditSchedule::from(row("Quarterly"));
        assert_eq!(schedule.rule.frequency, Frequency::Quarterly);
        assert_eq!(schedule.rule.day_of_month, Some(15));
        assert_eq!(schedule.rule.day_of_week, None);
        assert_eq!(schedule.created_by_id, Some(ActorId(42)));
    }

    #[test]
    fn context_row_with_missing_joins() {
        let ctx = ScheduleContext::from(ScheduleContextRow {
            schedule: row("monthly"),
            type_id: Some(3),
            type_name: Some("Infection Control".to_string()),
            type_is_active: Some(true),
            loc_id: None,
            loc_tenant_id: None,
            loc_name: None,
            tenant_row_id: Some(1),
            tenant_name: Some("Acme Care".to_string()),
        });
        assert!(ctx.audit_type.is_some());
        assert_eq!(ctx.missing_reference(), Some("location"));
    }

    #[test]
    fn instance_row_rejects_unknown_status() {
        let row = AuditInstanceRow {
            id: 1,
            tenant_id: 1,
            location_id: 2,
            audit_type_id: 3,
            audit_template_id: 4,
            audit_schedule_id: Some(7),
            audit_date: NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(),
            auditor_id: 1,
            auditor_name: None,
            auditor_role: None,
            status: "lost".to_string(),
            created_at: Utc::now(),
        };
        assert!(AuditInstance::try_from(row).is_err());
    }
}
