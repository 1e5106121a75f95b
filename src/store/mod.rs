//! Persistence contracts consumed by the reminder engine.
//!
//! The engine only talks to the three traits below; `SqliteTrackerStore`
//! implements all of them on a single database.
//!
//! Sub-modules:
//! - `schema`: SQLite DDL definitions.
//! - `sqlite`: SQLite-backed `SqliteTrackerStore`.

pub(crate) mod schema;
pub mod sqlite;

use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::tracker::{
    Group, GroupId, Member, MemberId, NewNotification, NewTask, Notification, NotificationId,
    Task, TaskId, TaskPriority, TaskStatus,
};

pub use sqlite::{SqliteStoreError, SqliteTrackerStore};

/// Task queries and the two mutations the engine performs.
pub trait TaskStore: Send + Sync {
    fn create_task(&self, task: &NewTask) -> Result<TaskId>;

    /// Fetch one task. Missing rows are [`NudgeError::NotFound`](crate::NudgeError::NotFound).
    fn get_task(&self, id: TaskId) -> Result<Task>;

    fn list_tasks_by_group(&self, group: GroupId) -> Result<Vec<Task>>;

    fn list_tasks_by_status(&self, group: GroupId, status: TaskStatus) -> Result<Vec<Task>>;

    fn list_tasks_by_priority(&self, group: GroupId, priority: TaskPriority) -> Result<Vec<Task>>;

    /// Tasks whose deadline falls in `from..=to`.
    fn list_tasks_by_deadline_range(
        &self,
        group: GroupId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Task>>;

    /// Tasks with `deadline < now` that are not completed.
    fn list_overdue_tasks(&self, group: GroupId, now: DateTime<Utc>) -> Result<Vec<Task>>;

    fn update_task_status(&self, id: TaskId, status: TaskStatus) -> Result<()>;

    fn update_task_priority(&self, id: TaskId, priority: TaskPriority) -> Result<()>;

    /// Delete a task. Its notifications go with it.
    fn delete_task(&self, id: TaskId) -> Result<()>;
}

/// Notification rows and their delivery bookkeeping.
pub trait NotificationStore: Send + Sync {
    /// Insert unless a row for the same (member, task, kind) exists.
    ///
    /// Returns `None` when the row already existed.
    fn create_notification(&self, notification: &NewNotification)
    -> Result<Option<NotificationId>>;

    fn get_notification(&self, id: NotificationId) -> Result<Notification>;

    /// Unsent rows scheduled at or before `now`, skipping rows under a live
    /// claim, rows waiting out a retry delay, and rows that have used up
    /// `max_attempts` (`0` = no limit). Ordered by scheduled time.
    fn list_ready_to_send(&self, now: DateTime<Utc>, max_attempts: u32)
    -> Result<Vec<Notification>>;

    /// Unsent rows for one member, earliest first.
    fn list_pending_for_member(&self, member: MemberId) -> Result<Vec<Notification>>;

    /// Atomically take a due row for delivery. Returns `false` if another
    /// dispatcher holds it or it was already sent.
    fn claim_notification(
        &self,
        id: NotificationId,
        claimant: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool>;

    /// Set the sent instant. Returns `false` if it was already set.
    fn mark_sent(&self, id: NotificationId, at: DateTime<Utc>) -> Result<bool>;

    /// Count a failed attempt and release the claim. Returns the new attempt count.
    fn record_failure(
        &self,
        id: NotificationId,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<u32>;

    fn delete_notifications_for_task(&self, task: TaskId) -> Result<usize>;
}

/// Groups and their membership.
pub trait GroupStore: Send + Sync {
    fn create_group(&self, name: &str) -> Result<GroupId>;

    fn create_member(&self, external_address: &str, display_name: &str) -> Result<MemberId>;

    fn get_member(&self, id: MemberId) -> Result<Member>;

    fn add_member(&self, group: GroupId, member: MemberId) -> Result<()>;

    fn list_groups(&self) -> Result<Vec<Group>>;

    fn list_members(&self, group: GroupId) -> Result<Vec<Member>>;
}
