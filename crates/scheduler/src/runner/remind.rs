use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use cadence_core::ReminderPolicy;

use super::{PassOutcome, ScheduleRunner};
use crate::error::ScheduleError;
use crate::messages::MessageContext;
use crate::store::ScheduleContext;

enum Reminded {
    Sent,
    Skipped,
}

impl ScheduleRunner {
    /// Notify owners about schedules inside their reminder window,
    /// overdue ones included.
    pub async fn send_reminders_on(&self, today: NaiveDate) -> PassOutcome {
        let contexts = match self.store.active_schedules_with_context().await {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "failed to load audit schedules for reminders");
                return PassOutcome::aborted(e);
            }
        };
        info!(today = %today, schedules = contexts.len(), "checking audit reminders");

        let results: Vec<Result<Reminded, ScheduleError>> = stream::iter(contexts)
            .map(|ctx| async move {
                let id = ctx.schedule.id;
                let result = self.remind_one(ctx, today).await;
                if let Err(ref e) = result {
                    warn!(schedule_id = id, error = %e, "reminder not sent");
                }
                result
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let sent = results
            .iter()
            .filter(|r| matches!(r, Ok(Reminded::Sent)))
            .count();
        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(sent, failed, "reminder pass complete");
        PassOutcome::completed(sent, failed)
    }

    async fn remind_one(&self, ctx: ScheduleContext, today: NaiveDate) -> Result<Reminded, ScheduleError> {
        let schedule_id = ctx.schedule.id;
        let missing = ctx.missing_reference();
        let ScheduleContext {
            schedule,
            audit_type: Some(audit_type),
            location: Some(location),
            tenant: Some(tenant),
        } = ctx
        else {
            warn!(schedule_id, missing = ?missing, "schedule references a deleted record, no reminder");
            return Ok(Reminded::Skipped);
        };

        let (Some(due), Some(days_until_due)) =
            (schedule.next_audit_due, schedule.days_until_due(today))
        else {
            return Ok(Reminded::Skipped);
        };
        let window = i64::from(schedule.reminder_window(self.config.default_reminder_days));
        if days_until_due > window {
            return Ok(Reminded::Skipped);
        }
        if self.config.reminder_policy == ReminderPolicy::OncePerDay
            && schedule.last_reminder_sent == Some(today)
        {
            debug!(schedule_id = schedule.id, "reminder already sent today");
            return Ok(Reminded::Skipped);
        }

        let message = MessageContext::new(schedule.id, audit_type.name, due, today)
            .at(location.name, tenant.name);
        let notification = self.composer.reminder(&message)?;
        self.notifier.send(&notification).await?;
        self.store.mark_reminder_sent(schedule.id, today).await?;

        info!(
            schedule_id = schedule.id,
            days_until_due,
            overdue = message.is_overdue(),
            "audit reminder sent"
        );
        Ok(Reminded::Sent)
    }
}
