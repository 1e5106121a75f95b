//! Shared types and helpers for tasks, reminders, groups and members.
//!
//! Everything here is storage-agnostic. Timestamps are `DateTime<Utc>` in
//! memory and whole epoch seconds on disk.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub type TaskId = i64;
pub type GroupId = i64;
pub type MemberId = i64;
pub type NotificationId = i64;

/// Display format used in reminder messages.
const DEADLINE_FORMAT: &str = "%d.%m.%Y %H:%M";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Urgency band derived from time-to-deadline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl TaskPriority {
    /// Step function over the time left until the deadline.
    ///
    /// Less than one day (including already past) is critical, less than
    /// three days is high, less than seven days is normal, anything else is low.
    #[must_use]
    pub fn for_time_remaining(remaining: Duration) -> Self {
        if remaining < Duration::days(1) {
            Self::Critical
        } else if remaining < Duration::days(3) {
            Self::High
        } else if remaining < Duration::days(7) {
            Self::Normal
        } else {
            Self::Low
        }
    }

    /// Priority for `deadline` as seen at `now`.
    #[must_use]
    pub fn for_deadline(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self::for_time_remaining(deadline - now)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task lifecycle status.
///
/// The engine only ever moves `Pending` to `Overdue`. Completion and
/// deletion belong to the task service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Completed,
    Overdue,
}

impl TaskStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Overdue => "overdue",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "overdue" => Some(Self::Overdue),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which reminder a notification represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReminderKind {
    #[serde(rename = "1day")]
    OneDay,
    #[serde(rename = "3days")]
    ThreeDays,
    #[serde(rename = "1week")]
    OneWeek,
}

impl ReminderKind {
    /// Map a configured day offset to a kind. Unrecognized offsets yield `None`.
    #[must_use]
    pub fn from_offset_days(days: i64) -> Option<Self> {
        match days {
            1 => Some(Self::OneDay),
            3 => Some(Self::ThreeDays),
            7 => Some(Self::OneWeek),
            _ => None,
        }
    }

    #[must_use]
    pub fn offset_days(self) -> i64 {
        match self {
            Self::OneDay => 1,
            Self::ThreeDays => 3,
            Self::OneWeek => 7,
        }
    }

    #[must_use]
    pub fn offset(self) -> Duration {
        Duration::days(self.offset_days())
    }

    /// Human phrase used in the reminder text.
    #[must_use]
    pub fn phrase(self) -> &'static str {
        match self {
            Self::OneDay => "tomorrow",
            Self::ThreeDays => "in 3 days",
            Self::OneWeek => "in a week",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneDay => "1day",
            Self::ThreeDays => "3days",
            Self::OneWeek => "1week",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1day" => Some(Self::OneDay),
            "3days" => Some(Self::ThreeDays),
            "1week" => Some(Self::OneWeek),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub group_id: GroupId,
    pub created_by: MemberId,
    pub assigned_to: Option<MemberId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Priority recomputation applies only to tasks that are still open.
    #[must_use]
    pub fn tracks_priority(&self) -> bool {
        self.status == TaskStatus::Pending
    }
}

/// Input for creating a task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub priority: TaskPriority,
    pub group_id: GroupId,
    pub created_by: MemberId,
    pub assigned_to: Option<MemberId>,
}

impl NewTask {
    /// A pending task whose priority is derived from its deadline at `now`.
    pub fn new(
        title: impl Into<String>,
        deadline: DateTime<Utc>,
        group_id: GroupId,
        created_by: MemberId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            deadline,
            priority: TaskPriority::for_deadline(deadline, now),
            group_id,
            created_by,
            assigned_to: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_assignee(mut self, member: MemberId) -> Self {
        self.assigned_to = Some(member);
        self
    }
}

/// One scheduled reminder for one member about one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub member_id: MemberId,
    pub task_id: TaskId,
    pub kind: ReminderKind,
    /// Set once at creation.
    pub scheduled_at: DateTime<Utc>,
    /// Set once, on the first successful delivery.
    pub sent_at: Option<DateTime<Utc>>,
    /// Failed delivery attempts so far.
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Earliest time of the next retry after a failure.
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Due means the scheduled instant has passed and nothing was sent yet.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at <= now && self.sent_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub member_id: MemberId,
    pub task_id: TaskId,
    pub kind: ReminderKind,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A group member reachable through an external messaging address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    /// Chat id, e-mail, or whatever the attached sender understands.
    pub external_address: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[must_use]
pub fn to_epoch_secs(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}

#[must_use]
pub fn from_epoch_secs(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Format a deadline the way reminder messages show it (`31.12.2025 18:00`).
#[must_use]
pub fn format_deadline(deadline: DateTime<Utc>) -> String {
    deadline.format(DEADLINE_FORMAT).to_string()
}
