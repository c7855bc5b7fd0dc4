//! Schedule runner: turns due schedules into audit work and reminders.
//!
//! Each pass scans the store once and processes schedules independently.
//! A per-schedule failure is logged and counted; only a failure to read
//! the schedule list fails the pass as a whole.

mod generate;
mod remind;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use cadence_core::config::SchedulerConfig;
use cadence_core::{ActorId, ReminderPolicy, DEFAULT_REMINDER_DAYS};
use cadence_notify::Notifier;

use crate::messages::MessageComposer;
use crate::store::ScheduleStore;

/// Runner settings, usually taken from [`SchedulerConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    pub default_reminder_days: i32,
    /// Auditor for generated work items whose schedule has no owner.
    pub system_actor: ActorId,
    pub reminder_policy: ReminderPolicy,
    /// Schedules processed concurrently within one pass.
    pub concurrency: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_reminder_days: DEFAULT_REMINDER_DAYS,
            system_actor: ActorId::SYSTEM,
            reminder_policy: ReminderPolicy::default(),
            concurrency: 1,
        }
    }
}

impl From<&SchedulerConfig> for RunnerConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            default_reminder_days: config.default_reminder_days,
            system_actor: config.system_actor_id,
            reminder_policy: config.reminder_policy,
            concurrency: config.concurrency.max(1),
        }
    }
}

/// Result of one generation or reminder pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassOutcome {
    pub success: bool,
    /// Schedules advanced, or reminders delivered.
    pub count: usize,
    /// Schedules that failed individually.
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PassOutcome {
    pub fn completed(count: usize, failed: usize) -> Self {
        Self {
            success: true,
            count,
            failed,
            error: None,
        }
    }

    pub fn aborted(error: impl ToString) -> Self {
        Self {
            success: false,
            count: 0,
            failed: 0,
            error: Some(error.to_string()),
        }
    }
}

/// Combined result of [`ScheduleRunner::run_automation`].
#[derive(Debug, Clone, Serialize)]
pub struct AutomationReport {
    pub run_id: Uuid,
    pub today: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub generation: PassOutcome,
    pub reminders: PassOutcome,
}

impl AutomationReport {
    pub fn success(&self) -> bool {
        self.generation.success && self.reminders.success
    }
}

/// Drives generation and reminder passes against a store and a notifier.
pub struct ScheduleRunner {
    store: Arc<dyn ScheduleStore>,
    notifier: Arc<dyn Notifier>,
    composer: MessageComposer,
    config: RunnerConfig,
}

impl ScheduleRunner {
    pub fn new(store: Arc<dyn ScheduleStore>, notifier: Arc<dyn Notifier>, config: RunnerConfig) -> Self {
        Self {
            store,
            notifier,
            composer: MessageComposer::default(),
            config,
        }
    }

    pub fn with_composer(mut self, composer: MessageComposer) -> Self {
        self.composer = composer;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Generate work for every schedule due today (UTC).
    pub async fn generate_due_work(&self) -> PassOutcome {
        self.generate_due_work_on(today_utc()).await
    }

    /// Send reminders as of today (UTC).
    pub async fn send_reminders(&self) -> PassOutcome {
        self.send_reminders_on(today_utc()).await
    }

    pub async fn run_automation(&self) -> AutomationReport {
        self.run_automation_on(today_utc()).await
    }

    /// Generation then reminders for `today`. The two passes are
    /// independent: a failed generation pass does not stop reminders.
    pub async fn run_automation_on(&self, today: NaiveDate) -> AutomationReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(run_id = %run_id, today = %today, "audit automation started");

        let generation = self.generate_due_work_on(today).await;
        let reminders = self.send_reminders_on(today).await;

        let report = AutomationReport {
            run_id,
            today,
            started_at,
            finished_at: Utc::now(),
            generation,
            reminders,
        };
        info!(
            run_id = %run_id,
            generated = report.generation.count,
            generation_failed = report.generation.failed,
            reminders_sent = report.reminders.count,
            reminders_failed = report.reminders.failed,
            success = report.success(),
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "audit automation finished"
        );
        report
    }
}

fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}
