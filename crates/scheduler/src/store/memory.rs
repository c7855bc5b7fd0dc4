use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use cadence_core::{
    AuditInstance, AuditSchedule, AuditTemplate, AuditType, AuditTypeId, Location, LocationId,
    NewAuditInstance, ScheduleAdvance, ScheduleId, Tenant, TenantId, WorkItemKey,
};

use super::{ScheduleStore, StoreError};

#[derive(Debug, Default)]
struct State {
    schedules: BTreeMap<ScheduleId, AuditSchedule>,
    audit_types: BTreeMap<AuditTypeId, AuditType>,
    templates: Vec<AuditTemplate>,
    locations: BTreeMap<LocationId, Location>,
    tenants: BTreeMap<TenantId, Tenant>,
    instances: Vec<AuditInstance>,
    unavailable: bool,
}

impl State {
    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(())
    }

    fn exists(&self, key: &WorkItemKey) -> bool {
        self.instances.iter().any(|i| {
            i.tenant_id == key.tenant_id
                && i.location_id == key.location_id
                && i.audit_type_id == key.audit_type_id
                && i.audit_schedule_id == Some(key.schedule_id)
                && i.audit_date == key.due_date
        })
    }

    fn insert(&mut self, item: &NewAuditInstance) -> Result<AuditInstance, StoreError> {
        let key = item.key();
        if self.exists(&key) {
            return Err(StoreError::Duplicate(key));
        }
        let instance = AuditInstance {
            id: self.instances.len() as i64 + 1,
            tenant_id: item.tenant_id,
            location_id: item.location_id,
            audit_type_id: item.audit_type_id,
            audit_template_id: item.audit_template_id,
            audit_schedule_id: Some(item.audit_schedule_id),
            audit_date: item.audit_date,
            auditor_id: item.auditor_id,
            auditor_name: Some(item.auditor_name.clone()),
            auditor_role: Some(item.auditor_role.clone()),
            status: item.status,
            created_at: Utc::now(),
        };
        self.instances.push(instance.clone());
        Ok(instance)
    }

    fn schedule_mut(&mut self, id: ScheduleId) -> Result<&mut AuditSchedule, StoreError> {
        self.schedules
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "audit schedule", id })
    }
}

/// In-process [`ScheduleStore`] backed by ordered maps.
///
/// Generation is atomic under a single lock, matching the transactional
/// behaviour of the Postgres store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-update.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_tenant(&self, tenant: Tenant) {
        self.lock().tenants.insert(tenant.id, tenant);
    }

    pub fn add_location(&self, location: Location) {
        self.lock().locations.insert(location.id, location);
    }

    pub fn add_audit_type(&self, audit_type: AuditType) {
        self.lock().audit_types.insert(audit_type.id, audit_type);
    }

    pub fn add_template(&self, template: AuditTemplate) {
        self.lock().templates.push(template);
    }

    pub fn add_schedule(&self, schedule: AuditSchedule) {
        self.lock().schedules.insert(schedule.id, schedule);
    }

    /// Make every subsequent operation fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    pub fn schedule(&self, id: ScheduleId) -> Option<AuditSchedule> {
        self.lock().schedules.get(&id).cloned()
    }

    pub fn instances(&self) -> Vec<AuditInstance> {
        self.lock().instances.clone()
    }

    pub fn instances_for(&self, schedule_id: ScheduleId) -> Vec<AuditInstance> {
        self.lock()
            .instances
            .iter()
            .filter(|i| i.audit_schedule_id == Some(schedule_id))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn active_schedules(&self) -> Result<Vec<AuditSchedule>, StoreError> {
        let state = self.lock();
        state.check()?;
        Ok(state
            .schedules
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }

    async fn audit_type(&self, id: AuditTypeId) -> Result<Option<AuditType>, StoreError> {
        let state = self.lock();
        state.check()?;
        Ok(state.audit_types.get(&id).cloned())
    }

    async fn template_for_audit_type(
        &self,
        audit_type_id: AuditTypeId,
    ) -> Result<Option<AuditTemplate>, StoreError> {
        let state = self.lock();
        state.check()?;
        let mut candidates: Vec<&AuditTemplate> = state
            .templates
            .iter()
            .filter(|t| t.audit_type_id == audit_type_id)
            .collect();
        candidates.sort_by_key(|t| (!t.is_active, t.id));
        Ok(candidates.first().map(|t| (*t).clone()))
    }

    async fn location(&self, id: LocationId) -> Result<Option<Location>, StoreError> {
        let state = self.lock();
        state.check()?;
        Ok(state.locations.get(&id).cloned())
    }

    async fn tenant(&self, id: TenantId) -> Result<Option<Tenant>, StoreError> {
        let state = self.lock();
        state.check()?;
        Ok(state.tenants.get(&id).cloned())
    }

    async fn audit_instance_exists(&self, key: &WorkItemKey) -> Result<bool, StoreError> {
        let state = self.lock();
        state.check()?;
        Ok(state.exists(key))
    }

    async fn insert_audit_instance(
        &self,
        item: &NewAuditInstance,
    ) -> Result<AuditInstance, StoreError> {
        let mut state = self.lock();
        state.check()?;
        state.insert(item)
    }

    async fn advance_schedule(&self, advance: &ScheduleAdvance) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.check()?;
        let schedule = state.schedule_mut(advance.schedule_id)?;
        schedule.last_audit_date = Some(advance.last_audit_date);
        schedule.next_audit_due = Some(advance.next_audit_due);
        Ok(())
    }

    async fn record_generation(
        &self,
        item: &NewAuditInstance,
        advance: &ScheduleAdvance,
    ) -> Result<AuditInstance, StoreError> {
        let mut state = self.lock();
        state.check()?;
        state.schedule_mut(advance.schedule_id)?;
        let instance = state.insert(item)?;
        let schedule = state.schedule_mut(advance.schedule_id)?;
        schedule.last_audit_date = Some(advance.last_audit_date);
        schedule.next_audit_due = Some(advance.next_audit_due);
        Ok(instance)
    }

    async fn mark_reminder_sent(
        &self,
        schedule_id: ScheduleId,
        on: NaiveDate,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.check()?;
        state.schedule_mut(schedule_id)?.last_reminder_sent = Some(on);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{ActorId, AuditStatus, Frequency, RecurrenceRule};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn schedule() -> AuditSchedule {
        AuditSchedule {
            id: 10,
            tenant_id: 1,
            location_id: 2,
            audit_type_id: 3,
            rule: RecurrenceRule::new(Frequency::Monthly),
            is_active: true,
            next_audit_due: Some(date(2025, 3, 1)),
            last_audit_date: None,
            email_reminder_days: None,
            last_reminder_sent: None,
            created_by_id: None,
        }
    }

    fn item(due: NaiveDate) -> NewAuditInstance {
        NewAuditInstance {
            tenant_id: 1,
            location_id: 2,
            audit_type_id: 3,
            audit_template_id: 4,
            audit_schedule_id: 10,
            audit_date: due,
            auditor_id: ActorId::SYSTEM,
            auditor_name: "System".to_string(),
            auditor_role: "Automated".to_string(),
            status: AuditStatus::InProgress,
        }
    }

    fn template(id: i64, active: bool) -> AuditTemplate {
        AuditTemplate {
            id,
            audit_type_id: 3,
            name: format!("Template {id}"),
            version: "1".to_string(),
            is_active: active,
        }
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = MemoryStore::new();
        store.add_schedule(schedule());
        store.insert_audit_instance(&item(date(2025, 3, 1))).await.unwrap();

        let err = store
            .insert_audit_instance(&item(date(2025, 3, 1)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(k) if k.schedule_id == 10));

        // A different cycle of the same schedule is a different key.
        assert!(store.insert_audit_instance(&item(date(2025, 4, 1))).await.is_ok());
    }

    #[tokio::test]
    async fn record_generation_advances_schedule() {
        let store = MemoryStore::new();
        store.add_schedule(schedule());
        let advance = ScheduleAdvance {
            schedule_id: 10,
            last_audit_date: date(2025, 3, 1),
            next_audit_due: date(2025, 4, 1),
        };
        let instance = store
            .record_generation(&item(date(2025, 3, 1)), &advance)
            .await
            .unwrap();
        assert_eq!(instance.audit_schedule_id, Some(10));

        let s = store.schedule(10).unwrap();
        assert_eq!(s.last_audit_date, Some(date(2025, 3, 1)));
        assert_eq!(s.next_audit_due, Some(date(2025, 4, 1)));
    }

    #[tokio::test]
    async fn record_generation_for_unknown_schedule_inserts_nothing() {
        let store = MemoryStore::new();
        let advance = ScheduleAdvance {
            schedule_id: 10,
            last_audit_date: date(2025, 3, 1),
            next_audit_due: date(2025, 4, 1),
        };
        let err = store
            .record_generation(&item(date(2025, 3, 1)), &advance)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id: 10, .. }));
        assert!(store.instances().is_empty());
    }

    #[tokio::test]
    async fn template_lookup_prefers_active() {
        let store = MemoryStore::new();
        store.add_template(template(1, false));
        store.add_template(template(2, true));
        let found = store.template_for_audit_type(3).await.unwrap().unwrap();
        assert_eq!(found.id, 2);
        assert!(store.template_for_audit_type(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unavailable_store_fails_reads() {
        let store = MemoryStore::new();
        store.add_schedule(schedule());
        store.set_unavailable(true);
        assert!(matches!(
            store.active_schedules().await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn context_reports_missing_reference() {
        let store = MemoryStore::new();
        store.add_schedule(schedule());
        store.add_audit_type(AuditType {
            id: 3,
            name: "Medication".to_string(),
            is_active: true,
        });
        let ctx = store.active_schedules_with_context().await.unwrap();
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx[0].missing_reference(), Some("location"));
    }
}
