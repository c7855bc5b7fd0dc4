//! Owner notification wording.
//!
//! Titles and bodies are minijinja templates rendered through the notify
//! crate's [`TemplateRenderer`]. The defaults can be overridden per
//! message from a YAML file; missing keys keep their default.

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use cadence_core::ScheduleId;
use cadence_notify::{Notification, NotifyError, TemplateRenderer};

use crate::error::TemplateFileError;

/// Template source for every message the runner sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageTemplates {
    pub scheduled_subject: String,
    pub scheduled_body: String,
    pub overdue_subject: String,
    pub overdue_body: String,
    pub upcoming_subject: String,
    pub upcoming_body: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            scheduled_subject: "New Audit Scheduled: {{ audit_type }}".to_string(),
            scheduled_body: "A new {{ audit_type }} audit has been automatically scheduled for \
                             {{ due_date }}. Please ensure it is completed on time."
                .to_string(),
            overdue_subject: "Overdue Audit: {{ audit_type }}".to_string(),
            overdue_body: "OVERDUE: {{ audit_type }} audit at {{ location }} was due \
                           {{ days_overdue }} day{{ days_overdue | pluralize }} ago ({{ due_date }}). \
                           Please complete immediately."
                .to_string(),
            upcoming_subject: "Audit Reminder: {{ audit_type }}".to_string(),
            upcoming_body: "REMINDER: {{ audit_type }} audit at {{ location }} is due \
                            {% if days_until_due == 0 %}today{% else %}in {{ days_until_due }} \
                            day{{ days_until_due | pluralize }}{% endif %} ({{ due_date }}). \
                            Please schedule completion."
                .to_string(),
        }
    }
}

impl MessageTemplates {
    /// Load overrides from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, TemplateFileError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| TemplateFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, TemplateFileError> {
        let templates: Self = serde_yaml::from_str(raw)?;
        templates.validate(&TemplateRenderer::new())?;
        Ok(templates)
    }

    fn entries(&self) -> [(&'static str, &str); 6] {
        [
            ("scheduled_subject", &self.scheduled_subject),
            ("scheduled_body", &self.scheduled_body),
            ("overdue_subject", &self.overdue_subject),
            ("overdue_body", &self.overdue_body),
            ("upcoming_subject", &self.upcoming_subject),
            ("upcoming_body", &self.upcoming_body),
        ]
    }

    /// Check every template compiles.
    pub fn validate(&self, renderer: &TemplateRenderer) -> Result<(), TemplateFileError> {
        for (name, source) in self.entries() {
            renderer
                .validate(source)
                .map_err(|source| TemplateFileError::Invalid { name, source })?;
        }
        Ok(())
    }
}

/// Values available to every message template.
#[derive(Debug, Clone, Serialize)]
pub struct MessageContext {
    pub schedule_id: ScheduleId,
    pub audit_type: String,
    pub location: Option<String>,
    pub tenant: Option<String>,
    pub due_date: NaiveDate,
    /// Negative when overdue.
    pub days_until_due: i64,
    pub days_overdue: i64,
}

impl MessageContext {
    pub fn new(schedule_id: ScheduleId, audit_type: impl Into<String>, due_date: NaiveDate, today: NaiveDate) -> Self {
        let days_until_due = due_date.signed_duration_since(today).num_days();
        Self {
            schedule_id,
            audit_type: audit_type.into(),
            location: None,
            tenant: None,
            due_date,
            days_until_due,
            days_overdue: (-days_until_due).max(0),
        }
    }

    pub fn at(mut self, location: impl Into<String>, tenant: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self.tenant = Some(tenant.into());
        self
    }

    pub fn is_overdue(&self) -> bool {
        self.days_until_due < 0
    }
}

/// Renders [`MessageTemplates`] into [`Notification`]s.
#[derive(Debug, Clone)]
pub struct MessageComposer {
    templates: MessageTemplates,
    renderer: Arc<TemplateRenderer>,
}

impl Default for MessageComposer {
    fn default() -> Self {
        Self {
            templates: MessageTemplates::default(),
            renderer: Arc::new(TemplateRenderer::new()),
        }
    }
}

impl MessageComposer {
    pub fn new(templates: MessageTemplates, renderer: Arc<TemplateRenderer>) -> Result<Self, TemplateFileError> {
        templates.validate(&renderer)?;
        Ok(Self { templates, renderer })
    }

    pub fn templates(&self) -> &MessageTemplates {
        &self.templates
    }

    /// Announcement for a freshly generated work item.
    pub fn scheduled(&self, ctx: &MessageContext) -> Result<Notification, NotifyError> {
        self.compose(
            "audit_scheduled",
            &self.templates.scheduled_subject,
            &self.templates.scheduled_body,
            ctx,
        )
    }

    /// Overdue or upcoming reminder, depending on the day count.
    pub fn reminder(&self, ctx: &MessageContext) -> Result<Notification, NotifyError> {
        if ctx.is_overdue() {
            self.compose(
                "audit_overdue",
                &self.templates.overdue_subject,
                &self.templates.overdue_body,
                ctx,
            )
        } else {
            self.compose(
                "audit_reminder",
                &self.templates.upcoming_subject,
                &self.templates.upcoming_body,
                ctx,
            )
        }
    }

    fn compose(
        &self,
        event: &str,
        subject: &str,
        body: &str,
        ctx: &MessageContext,
    ) -> Result<Notification, NotifyError> {
        let subject = self.renderer.render(subject, ctx)?;
        let body = self.renderer.render(body, ctx)?;
        Ok(Notification::new(subject, body)
            .with_meta("event", event)
            .with_meta("schedule_id", ctx.schedule_id)
            .with_meta("due_date", ctx.due_date))
    }
}
