//! Deadline reminder engine.
//!
//! Sub-modules:
//! - `interval`: polling period resolution.
//! - `status`: overdue marking and priority re-derivation.
//! - `planner`: per-task fan-out into notification rows.
//! - `sender`: delivery capability and shipped senders.
//! - `dispatcher`: claim, render, send and bookkeeping for due rows.
//! - `runner`: start/stop loop driving status sweeps and dispatch.

pub mod dispatcher;
pub mod interval;
pub mod planner;
pub mod runner;
pub mod sender;
pub mod status;

pub use dispatcher::{DispatchReport, NotificationDispatcher, SenderSlot, render_message};
pub use interval::{DEFAULT_CHECK_INTERVAL_HOURS, resolve_period};
pub use planner::{NotificationPlanner, PlanReport};
pub use runner::{CycleReport, ReminderScheduler};
pub use sender::{LogSender, NotificationSender, WebhookSender};
pub use status::{DeadlineStatusUpdater, SweepReport};

/// Upper bound for configured delays (ten years).
const MAX_DELAY_SECS: u64 = 10 * 365 * 24 * 3600;

/// Whole-second delay from config, capped so it can be added to any instant.
pub(crate) fn delay_from_secs(secs: u64) -> chrono::Duration {
    let capped = i64::try_from(secs.min(MAX_DELAY_SECS)).unwrap_or(0);
    chrono::Duration::seconds(capped)
}
