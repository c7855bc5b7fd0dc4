//! Cron trigger plan for the automation daemon.
//!
//! Two jobs are tracked: the full automation pass and the standalone
//! reminder pass. Expressions use standard 5-field cron and are evaluated
//! in UTC. The [`DispatchPlan`] only decides *when*; the binary runs the
//! passes.

pub(crate) mod cron;
mod plan;


pub use self::cron::{is_cron_due, normalize_cron};
pub use self::plan::{DispatchError, DispatchPlan, Job};
