//! Deadline status updater.
//!
//! A best-effort sweep over every group: overdue tasks flip from pending to
//! overdue, and open tasks get their priority band re-derived from the time
//! left until the deadline. One failing task or group never stops the sweep.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::store::{GroupStore, TaskStore};
use crate::tracker::{GroupId, TaskPriority, TaskStatus};

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Groups visited.
    pub groups: usize,
    /// Tasks moved from pending to overdue.
    pub marked_overdue: usize,
    /// Tasks whose stored priority changed.
    pub reprioritized: usize,
    /// Store errors logged and skipped.
    pub failures: usize,
}

pub struct DeadlineStatusUpdater {
    tasks: Arc<dyn TaskStore>,
    groups: Arc<dyn GroupStore>,
}

impl DeadlineStatusUpdater {
    pub fn new(tasks: Arc<dyn TaskStore>, groups: Arc<dyn GroupStore>) -> Self {
        Self { tasks, groups }
    }

    /// Run one sweep over all groups as of `now`.
    pub fn update_statuses(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let groups = match self.groups.list_groups() {
            Ok(groups) => groups,
            Err(e) => {
                warn!("cannot list groups for status sweep: {e}");
                report.failures += 1;
                return report;
            }
        };

        for group in groups {
            report.groups += 1;
            self.mark_overdue(group.id, now, &mut report);
            self.reprioritize(group.id, now, &mut report);
        }

        debug!(
            groups = report.groups,
            marked_overdue = report.marked_overdue,
            reprioritized = report.reprioritized,
            failures = report.failures,
            "status sweep finished"
        );
        report
    }

    fn mark_overdue(&self, group: GroupId, now: DateTime<Utc>, report: &mut SweepReport) {
        let overdue = match self.tasks.list_overdue_tasks(group, now) {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(group_id = group, "cannot list overdue tasks: {e}");
                report.failures += 1;
                return;
            }
        };

        for task in overdue.iter().filter(|t| t.status == TaskStatus::Pending) {
            if let Err(e) = self.tasks.update_task_status(task.id, TaskStatus::Overdue) {
                warn!(task_id = task.id, "cannot mark task overdue: {e}");
                report.failures += 1;
                continue;
            }
            report.marked_overdue += 1;
            debug!(task_id = task.id, "task is overdue");

            // Past the deadline the derived band is always critical.
            if task.priority != TaskPriority::Critical {
                match self
                    .tasks
                    .update_task_priority(task.id, TaskPriority::Critical)
                {
                    Ok(()) => report.reprioritized += 1,
                    Err(e) => {
                        warn!(task_id = task.id, "cannot raise overdue task priority: {e}");
                        report.failures += 1;
                    }
                }
            }
        }
    }

    fn reprioritize(&self, group: GroupId, now: DateTime<Utc>, report: &mut SweepReport) {
        let open = match self.tasks.list_tasks_by_status(group, TaskStatus::Pending) {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(group_id = group, "cannot list pending tasks: {e}");
                report.failures += 1;
                return;
            }
        };

        for task in open.iter().filter(|t| t.tracks_priority()) {
            let derived = TaskPriority::for_deadline(task.deadline, now);
            if derived == task.priority {
                continue;
            }
            match self.tasks.update_task_priority(task.id, derived) {
                Ok(()) => {
                    report.reprioritized += 1;
                    debug!(task_id = task.id, from = %task.priority, to = %derived, "priority changed");
                }
                Err(e) => {
                    warn!(task_id = task.id, "cannot update priority: {e}");
                    report.failures += 1;
                }
            }
        }
    }
}
