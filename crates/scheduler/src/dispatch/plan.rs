use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tracing::debug;

use cadence_core::config::SchedulerConfig;

use super::cron::{is_cron_due, normalize_cron};

/// A pass the daemon can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    /// Generation followed by reminders.
    Automation,
    /// Reminders only.
    Reminders,
}

impl Job {
    pub fn as_str(&self) -> &'static str {
        match self {
            Job::Automation => "automation",
            Job::Reminders => "reminders",
        }
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("invalid cron expression for {job} job '{expression}': {source}")]
    InvalidCron {
        job: Job,
        expression: String,
        #[source]
        source: cron::error::Error,
    },
}

#[derive(Debug, Clone)]
struct JobEntry {
    job: Job,
    expression: String,
    schedule: Schedule,
    last_triggered: Option<DateTime<Utc>>,
}

/// Trigger state for the daemon's jobs.
#[derive(Debug, Clone)]
pub struct DispatchPlan {
    entries: Vec<JobEntry>,
}

impl DispatchPlan {
    /// Build a plan whose first ticks are strictly after `now`.
    pub fn new(
        automation_cron: &str,
        reminder_cron: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, DispatchError> {
        let entries = [(Job::Automation, automation_cron), (Job::Reminders, reminder_cron)]
            .into_iter()
            .map(|(job, expr)| -> Result<JobEntry, DispatchError> {
                let expression = normalize_cron(expr);
                let schedule = Schedule::from_str(&expression).map_err(|source| {
                    DispatchError::InvalidCron {
                        job,
                        expression: expression.clone(),
                        source,
                    }
                })?;
                Ok(JobEntry {
                    job,
                    expression,
                    schedule,
                    last_triggered: Some(now),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    pub fn from_config(config: &SchedulerConfig, now: DateTime<Utc>) -> Result<Self, DispatchError> {
        Self::new(&config.automation_cron, &config.reminder_cron, now)
    }

    /// Normalized expression for `job`.
    pub fn expression(&self, job: Job) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.job == job)
            .map(|e| e.expression.as_str())
    }

    /// Earliest upcoming tick of any job strictly after `now`.
    pub fn next_fire(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.entries
            .iter()
            .filter_map(|e| e.schedule.after(&now).next())
            .min()
    }

    /// Jobs with a tick in `(last_triggered, now]`.
    ///
    /// An automation pass already sends reminders, so when both are due
    /// only [`Job::Automation`] is returned.
    pub fn due_jobs(&self, now: DateTime<Utc>) -> Vec<Job> {
        let due: Vec<Job> = self
            .entries
            .iter()
            .filter(|e| is_cron_due(&e.schedule, now, e.last_triggered))
            .map(|e| e.job)
            .collect();
        if due.contains(&Job::Automation) && due.contains(&Job::Reminders) {
            debug!("reminder tick folded into automation pass");
            return vec![Job::Automation];
        }
        due
    }

    /// Record that `job` ran at `at`.
    pub fn record_trigger_at(&mut self, job: Job, at: DateTime<Utc>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.job == job) {
            entry.last_triggered = Some(at);
        }
    }

    /// Record a batch of jobs; folded reminder ticks count as run too.
    pub fn record_all_at(&mut self, jobs: &[Job], at: DateTime<Utc>) {
        for job in jobs {
            self.record_trigger_at(*job, at);
        }
        if jobs.contains(&Job::Automation) {
            self.record_trigger_at(Job::Reminders, at);
        }
    }
}
