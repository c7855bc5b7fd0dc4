use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::entity::{ActorId, AuditTypeId, LocationId, ScheduleId, TenantId};
use crate::error::CoreError;

/// Reminder window applied when a schedule has no `email_reminder_days` of its own.
pub const DEFAULT_REMINDER_DAYS: i32 = 7;

/// How often a schedule recurs.
///
/// Stored as free text, so values this build does not know about are kept
/// verbatim in [`Frequency::Unrecognized`] instead of failing the row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annually,
    Unrecognized(String),
}

impl Frequency {
    pub fn as_str(&self) -> &str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Annually => "annually",
            Frequency::Unrecognized(raw) => raw.as_str(),
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Frequency::Unrecognized(_))
    }
}

impl From<&str> for Frequency {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "daily" => Frequency::Daily,
            "weekly" => Frequency::Weekly,
            "monthly" => Frequency::Monthly,
            "quarterly" => Frequency::Quarterly,
            "annually" => Frequency::Annually,
            _ => Frequency::Unrecognized(raw.to_string()),
        }
    }
}

impl From<String> for Frequency {
    fn from(raw: String) -> Self {
        Frequency::from(raw.as_str())
    }
}

impl From<Frequency> for String {
    fn from(f: Frequency) -> Self {
        f.as_str().to_string()
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frequency plus the optional anchor fields that pin an occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    /// 1-31.
    pub day_of_month: Option<u32>,
    /// 1-12.
    pub month_of_year: Option<u32>,
    /// 0-6, 0 = Sunday.
    pub day_of_week: Option<u32>,
}

impl RecurrenceRule {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            day_of_month: None,
            month_of_year: None,
            day_of_week: None,
        }
    }

    pub fn day_of_month(mut self, day: u32) -> Self {
        self.day_of_month = Some(day);
        self
    }

    pub fn month_of_year(mut self, month: u32) -> Self {
        self.month_of_year = Some(month);
        self
    }

    pub fn day_of_week(mut self, weekday: u32) -> Self {
        self.day_of_week = Some(weekday);
        self
    }
}

/// A recurring obligation to audit one location for one audit type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSchedule {
    pub id: ScheduleId,
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub audit_type_id: AuditTypeId,
    pub rule: RecurrenceRule,
    pub is_active: bool,
    pub next_audit_due: Option<NaiveDate>,
    pub last_audit_date: Option<NaiveDate>,
    pub email_reminder_days: Option<i32>,
    pub last_reminder_sent: Option<NaiveDate>,
    pub created_by_id: Option<ActorId>,
}

impl AuditSchedule {
    /// Whether a work item is owed for the cycle ending on or before `today`.
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.is_active && self.next_audit_due.is_some_and(|due| due <= today)
    }

    /// Reminder window in days, falling back to `default_days`.
    pub fn reminder_window(&self, default_days: i32) -> i32 {
        self.email_reminder_days.unwrap_or(default_days)
    }

    /// Signed whole days from `today` until the next due date.
    pub fn days_until_due(&self, today: NaiveDate) -> Option<i64> {
        self.next_audit_due
            .map(|due| due.signed_duration_since(today).num_days())
    }
}

/// Whether a schedule inside its reminder window is re-notified on every
/// pass or at most once per calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderPolicy {
    #[default]
    OncePerDay,
    EveryPass,
}

impl ReminderPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderPolicy::OncePerDay => "once_per_day",
            ReminderPolicy::EveryPass => "every_pass",
        }
    }
}

impl FromStr for ReminderPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "once_per_day" | "daily" => Ok(ReminderPolicy::OncePerDay),
            "every_pass" | "always" => Ok(ReminderPolicy::EveryPass),
            _ => Err(CoreError::InvalidValue {
                key: "REMINDER_POLICY".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ReminderPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
