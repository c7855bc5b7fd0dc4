use std::env;

use serde::{Deserialize, Serialize};

use crate::entity::ActorId;
use crate::error::CoreError;
use crate::schedule::{ReminderPolicy, DEFAULT_REMINDER_DAYS};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    match profiled_env_opt(profile, key) {
        Some(raw) => match raw.parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "unparseable config value, using default");
                default
            }
        },
        None => default,
    }
}

fn profiled_env_list(profile: &str, key: &str) -> Vec<String> {
    profiled_env_opt(profile, key)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub postgres: PostgresConfig,
    pub scheduler: SchedulerConfig,
    pub notify: NotifyConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CADENCE_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("CADENCE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            postgres: PostgresConfig::from_env_profiled(p),
            scheduler: SchedulerConfig::from_env_profiled(p),
            notify: NotifyConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject settings the runner cannot work with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.scheduler.concurrency == 0 {
            return Err(CoreError::Config(
                "SCHEDULER_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        if self.scheduler.automation_cron.trim().is_empty() {
            return Err(CoreError::Config("AUTOMATION_CRON must not be empty".to_string()));
        }
        if self.scheduler.reminder_cron.trim().is_empty() {
            return Err(CoreError::Config("REMINDER_CRON must not be empty".to_string()));
        }
        if self.notify.smtp_host.is_some() && self.notify.smtp_from.is_none() {
            return Err(CoreError::Config(
                "SMTP_FROM is required when SMTP_HOST is set".to_string(),
            ));
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  postgres:    host={}, db={}", self.postgres.host, self.postgres.database);
        tracing::info!(
            "  scheduler:   reminder_days={}, policy={}, concurrency={}, system_actor={}",
            self.scheduler.default_reminder_days,
            self.scheduler.reminder_policy,
            self.scheduler.concurrency,
            self.scheduler.system_actor_id,
        );
        tracing::info!(
            "  dispatch:    automation='{}', reminders='{}'",
            self.scheduler.automation_cron,
            self.scheduler.reminder_cron,
        );
        tracing::info!(
            "  notify:      webhook={}, smtp={}, owners={}",
            self.notify.webhook_url.is_some(),
            self.notify.smtp_host.as_deref().unwrap_or("(none)"),
            self.notify.owner_emails.len(),
        );
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Full connection URL; takes precedence over the individual fields.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_opt(p, "DATABASE_URL"),
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_parse(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "compliance"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_parse(p, "PG_MAX_CONNECTIONS", 5),
        }
    }

    pub fn database_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some() || self.username.is_some()
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Reminder window for schedules without `email_reminder_days`.
    pub default_reminder_days: i32,
    /// Actor credited with audit instances when a schedule has no owner.
    pub system_actor_id: ActorId,
    pub reminder_policy: ReminderPolicy,
    /// Schedules processed concurrently within one pass.
    pub concurrency: usize,
    /// 5-field cron for the combined generation + reminder pass.
    pub automation_cron: String,
    /// 5-field cron for the extra reminder-only passes.
    pub reminder_cron: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_reminder_days: DEFAULT_REMINDER_DAYS,
            system_actor_id: ActorId::SYSTEM,
            reminder_policy: ReminderPolicy::OncePerDay,
            concurrency: 1,
            automation_cron: "0 6 * * *".to_string(),
            reminder_cron: "0 9,15 * * *".to_string(),
        }
    }
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        Self {
            default_reminder_days: profiled_env_parse(
                p,
                "DEFAULT_REMINDER_DAYS",
                defaults.default_reminder_days,
            ),
            system_actor_id: ActorId(profiled_env_parse(
                p,
                "SYSTEM_ACTOR_ID",
                defaults.system_actor_id.get(),
            )),
            reminder_policy: profiled_env_parse(p, "REMINDER_POLICY", defaults.reminder_policy),
            concurrency: profiled_env_parse(p, "SCHEDULER_CONCURRENCY", defaults.concurrency),
            automation_cron: profiled_env_or(p, "AUTOMATION_CRON", &defaults.automation_cron),
            reminder_cron: profiled_env_or(p, "REMINDER_CRON", &defaults.reminder_cron),
        }
    }
}

// ── Notifications ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
    /// HTTP method for the webhook (defaults to POST).
    pub webhook_method: Option<String>,
    /// Minijinja body template; the notification is posted as JSON when unset.
    pub webhook_body_template: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_tls: bool,
    pub smtp_from: Option<String>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    /// Recipients of owner notifications when delivered by email.
    pub owner_emails: Vec<String>,
}

impl NotifyConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            webhook_url: profiled_env_opt(p, "NOTIFY_WEBHOOK_URL"),
            webhook_method: profiled_env_opt(p, "NOTIFY_WEBHOOK_METHOD"),
            webhook_body_template: profiled_env_opt(p, "NOTIFY_WEBHOOK_TEMPLATE"),
            smtp_host: profiled_env_opt(p, "SMTP_HOST"),
            smtp_port: profiled_env_opt(p, "SMTP_PORT").and_then(|v| v.parse().ok()),
            smtp_tls: profiled_env_or(p, "SMTP_TLS", "true") == "true",
            smtp_from: profiled_env_opt(p, "SMTP_FROM"),
            smtp_username: profiled_env_opt(p, "SMTP_USERNAME"),
            smtp_password: profiled_env_opt(p, "SMTP_PASSWORD"),
            owner_emails: profiled_env_list(p, "NOTIFY_OWNER_EMAILS"),
        }
    }

    /// SMTP login, only when both username and password are set.
    pub fn smtp_credentials(&self) -> Option<(&str, &str)> {
        Some((self.smtp_username.as_deref()?, self.smtp_password.as_deref()?))
    }

    pub fn email_configured(&self) -> bool {
        self.smtp_host.is_some() && self.smtp_from.is_some() && !self.owner_emails.is_empty()
    }
}
