//! End-to-end runner behaviour against the in-memory store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use cadence_core::{
    ActorId, AuditInstance, AuditSchedule, AuditStatus, AuditTemplate, AuditType, Frequency,
    Location, NewAuditInstance, RecurrenceRule, ReminderPolicy, ScheduleAdvance, Tenant,
    WorkItemKey,
};
use cadence_notify::{Notification, Notifier, NotifyError};
use cadence_scheduler::store::MemoryStore;
use cadence_scheduler::{RunnerConfig, ScheduleRunner, ScheduleStore, StoreError};

// ── fixtures ────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    fn failing() -> Self {
        let n = Self::default();
        n.fail.store(true, Ordering::SeqCst);
        n
    }

    fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    fn subjects(&self) -> Vec<String> {
        self.sent().into_iter().map(|n| n.subject).collect()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Config("mock failure".to_string()));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "recording"
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

const AUDIT_NAMES: [&str; 5] = [
    "Medication Audit",
    "Infection Control",
    "Fire Safety",
    "Care Plans",
    "Kitchen Hygiene",
];

/// Tenant 1, location 1 ("Oak House"), audit types 1-5 each with a template.
fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.add_tenant(Tenant {
        id: 1,
        name: "Acme Care".to_string(),
    });
    store.add_location(Location {
        id: 1,
        tenant_id: 1,
        name: "Oak House".to_string(),
    });
    for (idx, name) in AUDIT_NAMES.iter().enumerate() {
        let id = idx as i64 + 1;
        store.add_audit_type(AuditType {
            id,
            name: name.to_string(),
            is_active: true,
        });
        store.add_template(AuditTemplate {
            id: 100 + id,
            audit_type_id: id,
            name: format!("{name} v1"),
            version: "1".to_string(),
            is_active: true,
        });
    }
    store
}

fn schedule(id: i64, audit_type_id: i64, next_due: Option<NaiveDate>) -> AuditSchedule {
    AuditSchedule {
        id,
        tenant_id: 1,
        location_id: 1,
        audit_type_id,
        rule: RecurrenceRule::new(Frequency::Monthly).day_of_month(5),
        is_active: true,
        next_audit_due: next_due,
        last_audit_date: None,
        email_reminder_days: None,
        last_reminder_sent: None,
        created_by_id: None,
    }
}

/// A second runner's view: schedules read before another runner advanced
/// them, and an existence check that lost the race. Only the insert
/// itself can notice the duplicate.
struct StaleReadStore {
    inner: Arc<MemoryStore>,
    snapshot: Vec<AuditSchedule>,
}

impl StaleReadStore {
    fn new(inner: Arc<MemoryStore>, snapshot: Vec<AuditSchedule>) -> Self {
        Self { inner, snapshot }
    }
}

#[async_trait::async_trait]
impl ScheduleStore for StaleReadStore {
    async fn active_schedules(&self) -> Result<Vec<AuditSchedule>, StoreError> {
        Ok(self.snapshot.clone())
    }

    async fn audit_type(&self, id: i64) -> Result<Option<AuditType>, StoreError> {
        self.inner.audit_type(id).await
    }

    async fn template_for_audit_type(
        &self,
        audit_type_id: i64,
    ) -> Result<Option<AuditTemplate>, StoreError> {
        self.inner.template_for_audit_type(audit_type_id).await
    }

    async fn location(&self, id: i64) -> Result<Option<Location>, StoreError> {
        self.inner.location(id).await
    }

    async fn tenant(&self, id: i64) -> Result<Option<Tenant>, StoreError> {
        self.inner.tenant(id).await
    }

    async fn audit_instance_exists(&self, _key: &WorkItemKey) -> Result<bool, StoreError> {
        Ok(false)
    }

    async fn insert_audit_instance(
        &self,
        item: &NewAuditInstance,
    ) -> Result<AuditInstance, StoreError> {
        self.inner.insert_audit_instance(item).await
    }

    async fn advance_schedule(&self, advance: &ScheduleAdvance) -> Result<(), StoreError> {
        self.inner.advance_schedule(advance).await
    }

    async fn record_generation(
        &self,
        item: &NewAuditInstance,
        advance: &ScheduleAdvance,
    ) -> Result<AuditInstance, StoreError> {
        self.inner.record_generation(item, advance).await
    }

    async fn mark_reminder_sent(&self, schedule_id: i64, on: NaiveDate) -> Result<(), StoreError> {
        self.inner.mark_reminder_sent(schedule_id, on).await
    }
}

fn runner_with(
    store: &Arc<MemoryStore>,
    notifier: &Arc<RecordingNotifier>,
    config: RunnerConfig,
) -> ScheduleRunner {
    ScheduleRunner::new(store.clone(), notifier.clone(), config)
}

fn runner(store: &Arc<MemoryStore>, notifier: &Arc<RecordingNotifier>) -> ScheduleRunner {
    runner_with(store, notifier, RunnerConfig::default())
}

// ── generation ──────────────────────────────────────────────────────

#[tokio::test]
async fn monthly_schedule_end_to_end() {
    let store = seeded_store();
    store.add_schedule(schedule(1, 1, Some(date(2025, 3, 5))));
    let notifier = Arc::new(RecordingNotifier::default());

    let outcome = runner(&store, &notifier)
        .generate_due_work_on(date(2025, 3, 6))
        .await;
    assert!(outcome.success);
    assert_eq!(outcome.count, 1);

    let instances = store.instances_for(1);
    assert_eq!(instances.len(), 1);
    let instance = &instances[0];
    assert_eq!(instance.audit_date, date(2025, 3, 5));
    assert_eq!(instance.status, AuditStatus::InProgress);
    assert_eq!(instance.audit_template_id, 101);
    assert_eq!(instance.auditor_id, ActorId::SYSTEM);
    assert_eq!(instance.auditor_name.as_deref(), Some("System"));
    assert_eq!(instance.auditor_role.as_deref(), Some("Automated"));

    let advanced = store.schedule(1).unwrap();
    assert_eq!(advanced.last_audit_date, Some(date(2025, 3, 5)));
    assert_eq!(advanced.next_audit_due, Some(date(2025, 4, 5)));

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "New Audit Scheduled: Medication Audit");
    assert!(sent[0].body.contains("2025-03-05"), "got: {}", sent[0].body);
}

#[tokio::test]
async fn schedule_owner_is_credited_as_auditor() {
    let store = seeded_store();
    store.add_schedule(AuditSchedule {
        created_by_id: Some(ActorId(7)),
        ..schedule(1, 1, Some(date(2025, 3, 5)))
    });
    let notifier = Arc::new(RecordingNotifier::default());

    runner(&store, &notifier)
        .generate_due_work_on(date(2025, 3, 6))
        .await;
    let instances = store.instances_for(1);
    assert_eq!(instances[0].auditor_id, ActorId(7));
    assert_eq!(instances[0].auditor_name.as_deref(), Some("System"));
}

#[tokio::test]
async fn generation_is_idempotent_within_a_day() {
    let store = seeded_store();
    store.add_schedule(schedule(1, 1, Some(date(2025, 3, 5))));
    let notifier = Arc::new(RecordingNotifier::default());
    let runner = runner(&store, &notifier);

    let first = runner.generate_due_work_on(date(2025, 3, 6)).await;
    let second = runner.generate_due_work_on(date(2025, 3, 6)).await;
    assert_eq!(first.count, 1);
    assert_eq!(second.count, 0);
    assert_eq!(store.instances().len(), 1);
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn existing_work_item_is_not_duplicated() {
    let store = seeded_store();
    store.add_schedule(schedule(1, 1, Some(date(2025, 3, 5))));
    store
        .insert_audit_instance(&NewAuditInstance {
            tenant_id: 1,
            location_id: 1,
            audit_type_id: 1,
            audit_template_id: 101,
            audit_schedule_id: 1,
            audit_date: date(2025, 3, 5),
            auditor_id: ActorId(9),
            auditor_name: "Jo".to_string(),
            auditor_role: "Manager".to_string(),
            status: AuditStatus::InProgress,
        })
        .await
        .unwrap();
    let notifier = Arc::new(RecordingNotifier::default());

    let outcome = runner(&store, &notifier)
        .generate_due_work_on(date(2025, 3, 6))
        .await;
    assert!(outcome.success);
    assert_eq!(outcome.count, 0);
    assert_eq!(outcome.failed, 0);
    assert_eq!(store.instances().len(), 1);
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn next_cycle_generates_again() {
    let store = seeded_store();
    store.add_schedule(schedule(1, 1, Some(date(2025, 3, 5))));
    let notifier = Arc::new(RecordingNotifier::default());
    let runner = runner(&store, &notifier);

    runner.generate_due_work_on(date(2025, 3, 6)).await;
    let outcome = runner.generate_due_work_on(date(2025, 4, 5)).await;
    assert_eq!(outcome.count, 1);

    let dates: Vec<NaiveDate> = store.instances_for(1).iter().map(|i| i.audit_date).collect();
    assert_eq!(dates, vec![date(2025, 3, 5), date(2025, 4, 5)]);
    assert_eq!(store.schedule(1).unwrap().next_audit_due, Some(date(2025, 5, 5)));
}

#[tokio::test]
async fn long_overdue_schedule_catches_up_one_cycle_per_pass() {
    let store = seeded_store();
    store.add_schedule(schedule(1, 1, Some(date(2025, 1, 5))));
    let notifier = Arc::new(RecordingNotifier::default());
    let runner = runner(&store, &notifier);

    runner.generate_due_work_on(date(2025, 3, 6)).await;
    assert_eq!(store.schedule(1).unwrap().next_audit_due, Some(date(2025, 2, 5)));

    runner.generate_due_work_on(date(2025, 3, 6)).await;
    assert_eq!(store.schedule(1).unwrap().next_audit_due, Some(date(2025, 3, 5)));
    assert_eq!(store.instances_for(1).len(), 2);
}

#[tokio::test]
async fn one_broken_schedule_does_not_stop_the_others() {
    let store = seeded_store();
    for id in 1..=5 {
        // Schedule 3 points at an audit type that does not exist.
        let audit_type_id = if id == 3 { 99 } else { id };
        store.add_schedule(schedule(id, audit_type_id, Some(date(2025, 3, 5))));
    }
    let notifier = Arc::new(RecordingNotifier::default());

    let outcome = runner(&store, &notifier)
        .generate_due_work_on(date(2025, 3, 6))
        .await;
    assert!(outcome.success);
    assert_eq!(outcome.count, 4);
    assert_eq!(outcome.failed, 1);
    assert!(store.instances_for(3).is_empty());
    assert_eq!(store.schedule(3).unwrap().next_audit_due, Some(date(2025, 3, 5)));
}

#[tokio::test]
async fn concurrent_processing_gives_the_same_result() {
    let store = seeded_store();
    for id in 1..=5 {
        let audit_type_id = if id == 3 { 99 } else { id };
        store.add_schedule(schedule(id, audit_type_id, Some(date(2025, 3, 5))));
    }
    let notifier = Arc::new(RecordingNotifier::default());
    let config = RunnerConfig {
        concurrency: 4,
        ..RunnerConfig::default()
    };

    let outcome = runner_with(&store, &notifier, config)
        .generate_due_work_on(date(2025, 3, 6))
        .await;
    assert_eq!(outcome.count, 4);
    assert_eq!(store.instances().len(), 4);
}

#[tokio::test]
async fn missing_template_skips_schedule() {
    let store = Arc::new(MemoryStore::new());
    store.add_audit_type(AuditType {
        id: 1,
        name: "Medication Audit".to_string(),
        is_active: true,
    });
    store.add_schedule(schedule(1, 1, Some(date(2025, 3, 5))));
    let notifier = Arc::new(RecordingNotifier::default());

    let outcome = runner(&store, &notifier)
        .generate_due_work_on(date(2025, 3, 6))
        .await;
    assert!(outcome.success);
    assert_eq!(outcome.count, 0);
    assert_eq!(outcome.failed, 1);
    assert!(store.instances().is_empty());
}

#[tokio::test]
async fn schedules_not_due_are_left_alone() {
    let store = seeded_store();
    store.add_schedule(schedule(1, 1, Some(date(2025, 3, 7))));
    store.add_schedule(schedule(2, 2, None));
    store.add_schedule(AuditSchedule {
        is_active: false,
        ..schedule(3, 3, Some(date(2025, 3, 1)))
    });
    let notifier = Arc::new(RecordingNotifier::default());

    let outcome = runner(&store, &notifier)
        .generate_due_work_on(date(2025, 3, 6))
        .await;
    assert_eq!(outcome.count, 0);
    assert!(store.instances().is_empty());
}

#[tokio::test]
async fn duplicate_on_insert_counts_as_already_generated() {
    let store = seeded_store();
    store.add_schedule(schedule(1, 1, Some(date(2025, 3, 5))));
    let stale = store.active_schedules().await.unwrap();
    let notifier = Arc::new(RecordingNotifier::default());

    let first = runner(&store, &notifier)
        .generate_due_work_on(date(2025, 3, 6))
        .await;
    assert_eq!(first.count, 1);

    let racing = ScheduleRunner::new(
        Arc::new(StaleReadStore::new(store.clone(), stale)),
        notifier.clone(),
        RunnerConfig::default(),
    );
    let second = racing.generate_due_work_on(date(2025, 3, 6)).await;
    assert!(second.success);
    assert_eq!(second.count, 0);
    assert_eq!(second.failed, 0);
    assert_eq!(store.instances().len(), 1);
    assert_eq!(notifier.sent().len(), 1);
    assert_eq!(store.schedule(1).unwrap().next_audit_due, Some(date(2025, 4, 5)));
}

#[tokio::test]
async fn notification_failure_keeps_generated_work() {
    let store = seeded_store();
    store.add_schedule(schedule(1, 1, Some(date(2025, 3, 5))));
    let notifier = Arc::new(RecordingNotifier::failing());

    let outcome = runner(&store, &notifier)
        .generate_due_work_on(date(2025, 3, 6))
        .await;
    assert!(outcome.success);
    assert_eq!(outcome.count, 1);
    assert_eq!(store.instances().len(), 1);
    assert_eq!(store.schedule(1).unwrap().next_audit_due, Some(date(2025, 4, 5)));
}

#[tokio::test]
async fn unavailable_store_fails_the_pass() {
    let store = seeded_store();
    store.add_schedule(schedule(1, 1, Some(date(2025, 3, 5))));
    store.set_unavailable(true);
    let notifier = Arc::new(RecordingNotifier::default());
    let runner = runner(&store, &notifier);

    let generation = runner.generate_due_work_on(date(2025, 3, 6)).await;
    assert!(!generation.success);
    assert!(generation.error.is_some());

    let reminders = runner.send_reminders_on(date(2025, 3, 6)).await;
    assert!(!reminders.success);

    let json = serde_json::to_value(&generation).unwrap();
    assert!(json.get("error").is_some());
}

// ── reminders ───────────────────────────────────────────────────────

#[tokio::test]
async fn reminder_window_boundary() {
    let store = seeded_store();
    // Default window of 7 days.
    store.add_schedule(schedule(1, 1, Some(date(2025, 3, 8))));
    store.add_schedule(schedule(2, 2, Some(date(2025, 3, 9))));
    // Own window of 3 days.
    store.add_schedule(AuditSchedule {
        email_reminder_days: Some(3),
        ..schedule(3, 3, Some(date(2025, 3, 5)))
    });
    store.add_schedule(AuditSchedule {
        email_reminder_days: Some(3),
        ..schedule(4, 4, Some(date(2025, 3, 4)))
    });
    let notifier = Arc::new(RecordingNotifier::default());

    let outcome = runner(&store, &notifier)
        .send_reminders_on(date(2025, 3, 1))
        .await;
    assert!(outcome.success);
    assert_eq!(outcome.count, 2);

    let mut subjects = notifier.subjects();
    subjects.sort();
    assert_eq!(
        subjects,
        vec![
            "Audit Reminder: Care Plans".to_string(),
            "Audit Reminder: Medication Audit".to_string(),
        ]
    );
    assert_eq!(store.schedule(1).unwrap().last_reminder_sent, Some(date(2025, 3, 1)));
    assert_eq!(store.schedule(2).unwrap().last_reminder_sent, None);
}

#[tokio::test]
async fn overdue_and_upcoming_wording() {
    let store = seeded_store();
    store.add_schedule(schedule(1, 1, Some(date(2025, 3, 1))));
    store.add_schedule(schedule(2, 2, Some(date(2025, 3, 6))));
    let notifier = Arc::new(RecordingNotifier::default());

    runner(&store, &notifier)
        .send_reminders_on(date(2025, 3, 4))
        .await;

    let sent = notifier.sent();
    let overdue = sent
        .iter()
        .find(|n| n.subject == "Overdue Audit: Medication Audit")
        .expect("overdue reminder");
    assert_eq!(
        overdue.body,
        "OVERDUE: Medication Audit audit at Oak House was due 3 days ago (2025-03-01). \
         Please complete immediately."
    );
    let upcoming = sent
        .iter()
        .find(|n| n.subject == "Audit Reminder: Infection Control")
        .expect("upcoming reminder");
    assert_eq!(
        upcoming.body,
        "REMINDER: Infection Control audit at Oak House is due in 2 days (2025-03-06). \
         Please schedule completion."
    );
}

#[tokio::test]
async fn once_per_day_policy_suppresses_repeat_reminders() {
    let store = seeded_store();
    store.add_schedule(schedule(1, 1, Some(date(2025, 3, 6))));
    let notifier = Arc::new(RecordingNotifier::default());
    let runner = runner(&store, &notifier);

    assert_eq!(runner.send_reminders_on(date(2025, 3, 4)).await.count, 1);
    assert_eq!(runner.send_reminders_on(date(2025, 3, 4)).await.count, 0);
    assert_eq!(runner.send_reminders_on(date(2025, 3, 5)).await.count, 1);
    assert_eq!(notifier.sent().len(), 2);
}

#[tokio::test]
async fn every_pass_policy_repeats_reminders() {
    let store = seeded_store();
    store.add_schedule(schedule(1, 1, Some(date(2025, 3, 6))));
    let notifier = Arc::new(RecordingNotifier::default());
    let config = RunnerConfig {
        reminder_policy: ReminderPolicy::EveryPass,
        ..RunnerConfig::default()
    };
    let runner = runner_with(&store, &notifier, config);

    assert_eq!(runner.send_reminders_on(date(2025, 3, 4)).await.count, 1);
    assert_eq!(runner.send_reminders_on(date(2025, 3, 4)).await.count, 1);
    assert_eq!(notifier.sent().len(), 2);
}

#[tokio::test]
async fn failed_reminder_is_not_recorded() {
    let store = seeded_store();
    store.add_schedule(schedule(1, 1, Some(date(2025, 3, 6))));
    let notifier = Arc::new(RecordingNotifier::failing());

    let outcome = runner(&store, &notifier)
        .send_reminders_on(date(2025, 3, 4))
        .await;
    assert!(outcome.success);
    assert_eq!(outcome.count, 0);
    assert_eq!(outcome.failed, 1);
    assert_eq!(store.schedule(1).unwrap().last_reminder_sent, None);
}

#[tokio::test]
async fn inactive_schedule_gets_no_reminder() {
    let store = seeded_store();
    store.add_schedule(AuditSchedule {
        is_active: false,
        ..schedule(1, 1, Some(date(2025, 3, 3)))
    });
    store.add_schedule(AuditSchedule {
        is_active: false,
        ..schedule(2, 2, Some(date(2025, 3, 8)))
    });
    let notifier = Arc::new(RecordingNotifier::default());

    let outcome = runner(&store, &notifier)
        .send_reminders_on(date(2025, 3, 6))
        .await;
    assert!(outcome.success);
    assert_eq!(outcome.count, 0);
    assert_eq!(outcome.failed, 0);
    assert!(notifier.sent().is_empty());
    assert_eq!(store.schedule(1).unwrap().last_reminder_sent, None);
}

#[tokio::test]
async fn orphaned_schedule_gets_no_reminder() {
    let store = seeded_store();
    store.add_schedule(AuditSchedule {
        location_id: 42,
        ..schedule(1, 1, Some(date(2025, 3, 6)))
    });
    store.add_schedule(schedule(2, 2, Some(date(2025, 3, 6))));
    let notifier = Arc::new(RecordingNotifier::default());

    let outcome = runner(&store, &notifier)
        .send_reminders_on(date(2025, 3, 4))
        .await;
    assert_eq!(outcome.count, 1);
    assert_eq!(outcome.failed, 0);
    assert_eq!(notifier.subjects(), vec!["Audit Reminder: Infection Control".to_string()]);
    assert_eq!(store.schedule(1).unwrap().last_reminder_sent, None);
}

// ── orchestration ───────────────────────────────────────────────────

#[tokio::test]
async fn run_automation_generates_then_reminds() {
    let store = seeded_store();
    store.add_schedule(schedule(1, 1, Some(date(2025, 3, 5))));
    store.add_schedule(schedule(2, 2, Some(date(2025, 3, 10))));
    let notifier = Arc::new(RecordingNotifier::default());

    let report = runner(&store, &notifier)
        .run_automation_on(date(2025, 3, 6))
        .await;
    assert!(report.success());
    assert_eq!(report.today, date(2025, 3, 6));
    assert_eq!(report.generation.count, 1);
    // Schedule 1 moved to 2025-04-05, outside its window; schedule 2 is 4 days out.
    assert_eq!(report.reminders.count, 1);
    assert!(report.finished_at >= report.started_at);

    assert_eq!(
        notifier.subjects(),
        vec![
            "New Audit Scheduled: Medication Audit".to_string(),
            "Audit Reminder: Infection Control".to_string(),
        ]
    );

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["generation"]["count"], 1);
    assert!(json["generation"].get("error").is_none());
}
