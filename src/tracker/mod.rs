//! Task-tracker domain model shared by the store and the reminder engine.
//!
//! Sub-modules:
//! - `types`: tasks, notifications, groups, members and their enums.

pub mod types;

pub use types::{
    Group, GroupId, Member, MemberId, NewNotification, NewTask, Notification, NotificationId,
    ReminderKind, Task, TaskId, TaskPriority, TaskStatus, format_deadline, from_epoch_secs,
    to_epoch_secs,
};
