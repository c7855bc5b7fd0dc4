//! audit-automation — recurring compliance audit generation and reminders.
//!
//! One-shot subcommands run a single pass and print its result as JSON.
//! `daemon` fires passes on the `AUTOMATION_CRON` / `REMINDER_CRON`
//! schedule (UTC) until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use cadence_core::config::{load_dotenv, Config};
use cadence_notify::{Dispatcher, Notifier, TemplateRenderer};
use cadence_scheduler::db::init_pg_pool;
use cadence_scheduler::dispatch::{DispatchPlan, Job};
use cadence_scheduler::messages::{MessageComposer, MessageTemplates};
use cadence_scheduler::store::PgScheduleStore;
use cadence_scheduler::{PassOutcome, RunnerConfig, ScheduleRunner};

// ── CLI ─────────────────────────────────────────────────────────────

/// Recurring audit scheduler: generates due audits and sends owner reminders.
#[derive(Parser, Debug)]
#[command(name = "audit-automation", version, about)]
struct Cli {
    /// Configuration profile (e.g. PROD); keys are read as {PROFILE}_{KEY}.
    #[arg(long, env = "CADENCE_PROFILE")]
    profile: Option<String>,

    /// YAML file overriding notification message templates.
    #[arg(long, env = "AUDIT_MESSAGE_TEMPLATES")]
    templates: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate due audits, then send reminders.
    Run {
        /// Treat this date (YYYY-MM-DD) as today.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Generate due audits only.
    Generate {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Send reminders only.
    Remind {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Run passes on the configured cron schedule until Ctrl-C.
    Daemon,
    /// Send a test notification through every configured channel.
    TestNotify,
}

// ── helpers ─────────────────────────────────────────────────────────

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn finish_pass(outcome: PassOutcome) -> anyhow::Result<()> {
    print_json(&outcome)?;
    if !outcome.success {
        anyhow::bail!(
            "pass failed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn test_channels(dispatcher: &Dispatcher) -> anyhow::Result<()> {
    let mut results = Vec::with_capacity(dispatcher.len());
    for (idx, name) in dispatcher.channel_names().into_iter().enumerate() {
        let result = dispatcher.test_channel(idx).await;
        results.push(serde_json::json!({
            "channel": name,
            "success": result.is_ok(),
            "error": result.err().map(|e| e.to_string()),
        }));
    }
    print_json(&results)
}

async fn run_daemon(runner: &ScheduleRunner, config: &Config) -> anyhow::Result<()> {
    let mut plan = DispatchPlan::from_config(&config.scheduler, Utc::now())?;
    info!(
        automation = plan.expression(Job::Automation).unwrap_or_default(),
        reminders = plan.expression(Job::Reminders).unwrap_or_default(),
        "audit automation daemon started"
    );

    loop {
        let now = Utc::now();
        let Some(next) = plan.next_fire(now) else {
            warn!("no upcoming cron ticks, daemon exiting");
            break;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        info!(next = %next, wait_secs = wait.as_secs(), "waiting for next trigger");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }

        let fired_at = Utc::now();
        let jobs = plan.due_jobs(fired_at);
        for job in &jobs {
            match job {
                Job::Automation => {
                    let report = runner.run_automation_on(fired_at.date_naive()).await;
                    if !report.success() {
                        warn!(run_id = %report.run_id, "automation pass reported failures");
                    }
                }
                Job::Reminders => {
                    let outcome = runner.send_reminders_on(fired_at.date_naive()).await;
                    if let Some(e) = &outcome.error {
                        warn!(error = %e, "reminder pass failed");
                    }
                }
            }
        }
        plan.record_all_at(&jobs, fired_at);
    }

    info!("audit automation daemon exited cleanly");
    Ok(())
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.profile {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    config.validate()?;
    config.log_summary();

    let renderer = Arc::new(TemplateRenderer::new());
    let dispatcher = Dispatcher::from_config(&config.notify, renderer.clone())?;
    info!(channels = ?dispatcher.channel_names(), "notification channels ready");

    if let Command::TestNotify = cli.command {
        return test_channels(&dispatcher).await;
    }

    let templates = match &cli.templates {
        Some(path) => {
            let templates = MessageTemplates::from_yaml_file(path)?;
            info!(path = %path.display(), "loaded message templates");
            templates
        }
        None => MessageTemplates::default(),
    };
    let composer = MessageComposer::new(templates, renderer)?;

    let pool = init_pg_pool(&config.postgres)
        .await
        .context("failed to initialise PostgreSQL")?;
    let store = Arc::new(PgScheduleStore::new(pool));
    let notifier: Arc<dyn Notifier> = Arc::new(dispatcher);

    let runner = ScheduleRunner::new(store, notifier, RunnerConfig::from(&config.scheduler))
        .with_composer(composer);

    match cli.command {
        Command::Run { date } => {
            let report = match date {
                Some(today) => runner.run_automation_on(today).await,
                None => runner.run_automation().await,
            };
            print_json(&report)?;
            if !report.success() {
                anyhow::bail!("automation run {} reported failures", report.run_id);
            }
            Ok(())
        }
        Command::Generate { date } => {
            let outcome = match date {
                Some(today) => runner.generate_due_work_on(today).await,
                None => runner.generate_due_work().await,
            };
            finish_pass(outcome)
        }
        Command::Remind { date } => {
            let outcome = match date {
                Some(today) => runner.send_reminders_on(today).await,
                None => runner.send_reminders().await,
            };
            finish_pass(outcome)
        }
        Command::Daemon => run_daemon(&runner, &config).await,
        Command::TestNotify => Ok(()),
    }
}
