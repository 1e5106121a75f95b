//! Notification planner.
//!
//! Fans a task out into one notification per (group member, reminder kind).
//! Rows are keyed on that triple in the store, so planning the same task
//! again only fills in what is missing.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::delay_from_secs;
use crate::config::ReminderConfig;
use crate::error::Result;
use crate::store::{GroupStore, NotificationStore, TaskStore};
use crate::tracker::{MemberId, NewNotification, NotificationId, ReminderKind, TaskId};

/// Outcome of planning one task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanReport {
    /// New notification rows.
    pub created: usize,
    /// Rows that already existed for the same member, task and kind.
    pub skipped_existing: usize,
    /// Configured offsets with no matching reminder kind.
    pub skipped_unknown_offset: usize,
    /// Row inserts that failed and were skipped.
    pub failed: usize,
}

pub struct NotificationPlanner {
    tasks: Arc<dyn TaskStore>,
    groups: Arc<dyn GroupStore>,
    notifications: Arc<dyn NotificationStore>,
    config: ReminderConfig,
}

impl NotificationPlanner {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        groups: Arc<dyn GroupStore>,
        notifications: Arc<dyn NotificationStore>,
        config: ReminderConfig,
    ) -> Self {
        Self {
            tasks,
            groups,
            notifications,
            config,
        }
    }

    /// Plan reminders for a freshly created (or edited) task.
    ///
    /// Best-effort: a failed insert is logged and counted, and rows created
    /// before it are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the task or its group's members cannot be read.
    pub fn plan_notifications(&self, task_id: TaskId, now: DateTime<Utc>) -> Result<PlanReport> {
        let mut report = PlanReport::default();
        if !self.config.enabled {
            debug!(task_id, "reminders disabled, not planning");
            return Ok(report);
        }

        let task = self.tasks.get_task(task_id)?;
        if task.deadline <= now {
            debug!(task_id, "deadline already passed, not planning");
            return Ok(report);
        }

        let mut kinds = BTreeSet::new();
        for &days in &self.config.default_reminders {
            match ReminderKind::from_offset_days(days) {
                Some(kind) => {
                    kinds.insert(kind);
                }
                None => {
                    debug!(task_id, days, "ignoring unsupported reminder offset");
                    report.skipped_unknown_offset += 1;
                }
            }
        }

        let schedule = plan_schedule(
            task.deadline,
            now,
            &kinds,
            delay_from_secs(self.config.grace_delay_secs),
        );
        if schedule.is_empty() {
            return Ok(report);
        }

        let members = self.groups.list_members(task.group_id)?;
        for member in &members {
            for &(kind, scheduled_at) in &schedule {
                let row = NewNotification {
                    member_id: member.id,
                    task_id,
                    kind,
                    scheduled_at,
                };
                match self.notifications.create_notification(&row) {
                    Ok(Some(id)) => {
                        report.created += 1;
                        debug!(notification_id = id, task_id, member_id = member.id, %kind, %scheduled_at, "notification planned");
                    }
                    Ok(None) => report.skipped_existing += 1,
                    Err(e) => {
                        warn!(task_id, member_id = member.id, %kind, "cannot create notification: {e}");
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            task_id,
            members = members.len(),
            created = report.created,
            skipped_existing = report.skipped_existing,
            failed = report.failed,
            "planned reminders"
        );
        Ok(report)
    }

    /// Remove every notification of a task. Returns the number of rows deleted.
    pub fn delete_task_notifications(&self, task_id: TaskId) -> Result<usize> {
        let removed = self.notifications.delete_notifications_for_task(task_id)?;
        debug!(task_id, removed, "deleted task notifications");
        Ok(removed)
    }

    /// Schedule a one-day reminder for `member` due `delay` after `now`.
    ///
    /// Returns `None` if the member already has a one-day reminder for the task.
    pub fn schedule_test_notification(
        &self,
        member: MemberId,
        task_id: TaskId,
        delay: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<NotificationId>> {
        // Fail on unknown rows before inserting.
        self.tasks.get_task(task_id)?;
        self.groups.get_member(member)?;

        let id = self.notifications.create_notification(&NewNotification {
            member_id: member,
            task_id,
            kind: ReminderKind::OneDay,
            scheduled_at: now + delay,
        })?;
        info!(task_id, member_id = member, ?id, "test notification scheduled");
        Ok(id)
    }
}

/// Decide when each reminder kind fires for a deadline still in the future.
///
/// Kinds whose instant is still ahead fire on time. Kinds whose instant has
/// passed are dropped, unless none is left ahead: then the kind closest to
/// the deadline fires after `grace` (never later than the deadline).
fn plan_schedule(
    deadline: DateTime<Utc>,
    now: DateTime<Utc>,
    kinds: &BTreeSet<ReminderKind>,
    grace: Duration,
) -> Vec<(ReminderKind, DateTime<Utc>)> {
    let upcoming: Vec<_> = kinds
        .iter()
        .map(|&kind| (kind, deadline - kind.offset()))
        .filter(|&(_, at)| at > now)
        .collect();
    if !upcoming.is_empty() {
        return upcoming;
    }

    kinds
        .first()
        .map(|&kind| vec![(kind, (now + grace).min(deadline))])
        .unwrap_or_default()
}
