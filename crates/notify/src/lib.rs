//! Owner notifications for the audit scheduler.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable notification channels
//! - Webhook, email, and log-only notifier implementations
//! - Minijinja template rendering for notification messages
//! - Dispatcher that fans a notification out to every configured channel

pub mod dispatcher;
pub mod email;
pub mod log;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use dispatcher::Dispatcher;
pub use templating::TemplateRenderer;
pub use traits::{DispatchResult, Notification, Notifier, NotifyError};
