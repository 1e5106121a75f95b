//! Nudge: deadline-driven reminder engine for group task trackers.
//!
//! The engine recomputes task urgency as deadlines approach and delivers
//! time-scheduled reminders to group members, once per scheduled reminder.
//!
//! # Architecture
//!
//! - **Planner**: fans a new task out into one notification per member and
//!   reminder offset
//! - **Status updater**: marks overdue tasks and re-derives priority bands
//! - **Dispatcher**: sends due notifications through an attached sender
//! - **Scheduler**: background loop running the updater then the dispatcher
//!
//! Tasks, groups and notifications live in SQLite via [`store::SqliteTrackerStore`].

pub mod config;
pub mod error;
pub mod nudge_dirs;
pub mod reminders;
pub mod store;
pub mod tracker;


pub use config::NudgeConfig;
pub use error::{NudgeError, Result};
pub use reminders::{
    DeadlineStatusUpdater, NotificationDispatcher, NotificationPlanner, NotificationSender,
    ReminderScheduler,
};
pub use store::SqliteTrackerStore;
