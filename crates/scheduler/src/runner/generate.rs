use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use cadence_core::{
    AuditSchedule, AuditStatus, NewAuditInstance, ScheduleAdvance, SYSTEM_AUDITOR_NAME,
    SYSTEM_AUDITOR_ROLE,
};

use super::{PassOutcome, ScheduleRunner};
use crate::error::ScheduleError;
use crate::messages::MessageContext;
use crate::recurrence::next_due_date;
use crate::store::StoreError;

enum Generated {
    Created,
    Skipped,
}

impl ScheduleRunner {
    /// Create one work item per due schedule and advance each schedule to
    /// its next occurrence.
    pub async fn generate_due_work_on(&self, today: NaiveDate) -> PassOutcome {
        let schedules = match self.store.active_schedules().await {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to load audit schedules");
                return PassOutcome::aborted(e);
            }
        };

        let due: Vec<AuditSchedule> = schedules.into_iter().filter(|s| s.is_due(today)).collect();
        info!(today = %today, due = due.len(), "checking due audit schedules");

        let results: Vec<Result<Generated, ScheduleError>> = stream::iter(due)
            .map(|schedule| async move {
                let id = schedule.id;
                let result = self.generate_one(schedule, today).await;
                if let Err(ref e) = result {
                    warn!(schedule_id = id, error = %e, "skipping schedule");
                }
                result
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let created = results
            .iter()
            .filter(|r| matches!(r, Ok(Generated::Created)))
            .count();
        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(created, failed, "audit generation pass complete");
        PassOutcome::completed(created, failed)
    }

    async fn generate_one(
        &self,
        schedule: AuditSchedule,
        today: NaiveDate,
    ) -> Result<Generated, ScheduleError> {
        let Some(due) = schedule.next_audit_due else {
            return Ok(Generated::Skipped);
        };

        let audit_type = self
            .store
            .audit_type(schedule.audit_type_id)
            .await?
            .ok_or(ScheduleError::MissingAuditType {
                schedule_id: schedule.id,
                audit_type_id: schedule.audit_type_id,
            })?;
        let template = self
            .store
            .template_for_audit_type(schedule.audit_type_id)
            .await?
            .ok_or(ScheduleError::MissingTemplate {
                schedule_id: schedule.id,
                audit_type_id: schedule.audit_type_id,
            })?;

        let item = NewAuditInstance {
            tenant_id: schedule.tenant_id,
            location_id: schedule.location_id,
            audit_type_id: schedule.audit_type_id,
            audit_template_id: template.id,
            audit_schedule_id: schedule.id,
            audit_date: due,
            auditor_id: schedule.created_by_id.unwrap_or(self.config.system_actor),
            auditor_name: SYSTEM_AUDITOR_NAME.to_string(),
            auditor_role: SYSTEM_AUDITOR_ROLE.to_string(),
            status: AuditStatus::InProgress,
        };

        if self.store.audit_instance_exists(&item.key()).await? {
            debug!(schedule_id = schedule.id, due = %due, "audit instance already exists");
            return Ok(Generated::Skipped);
        }

        if !schedule.rule.frequency.is_recognized() {
            warn!(
                schedule_id = schedule.id,
                frequency = %schedule.rule.frequency,
                "unrecognized frequency, advancing monthly on the 1st"
            );
        }
        let next = next_due_date(&schedule.rule, due).ok_or(ScheduleError::Recurrence {
            schedule_id: schedule.id,
            after: due,
        })?;
        let advance = ScheduleAdvance {
            schedule_id: schedule.id,
            last_audit_date: due,
            next_audit_due: next,
        };

        let instance = match self.store.record_generation(&item, &advance).await {
            Ok(instance) => instance,
            Err(StoreError::Duplicate(_)) => {
                debug!(schedule_id = schedule.id, due = %due, "audit instance created concurrently");
                return Ok(Generated::Skipped);
            }
            Err(e) => return Err(e.into()),
        };
        info!(
            schedule_id = schedule.id,
            audit_instance_id = instance.id,
            audit_date = %due,
            next_due = %next,
            "audit instance created"
        );

        let ctx = MessageContext::new(schedule.id, audit_type.name, due, today);
        let sent = match self.composer.scheduled(&ctx) {
            Ok(notification) => self.notifier.send(&notification).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            warn!(schedule_id = schedule.id, error = %e, "new audit notification failed");
        }

        Ok(Generated::Created)
    }
}
