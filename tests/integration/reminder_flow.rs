//! Planner, status sweep and dispatch working together on one database.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use nudge::SqliteTrackerStore;
use nudge::config::ReminderConfig;
use nudge::reminders::DeadlineStatusUpdater;
use nudge::store::{NotificationStore, TaskStore};
use nudge::tracker::{ReminderKind, TaskPriority, TaskStatus};

use crate::helpers::{Harness, RecordingSender, address};

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 15, 8, 30, 0).unwrap()
}

#[tokio::test]
async fn deadline_in_23_hours_is_reminded_once() {
    let harness = Harness::new(1);
    let config = ReminderConfig::default();
    let task = harness.create_task("Lab report", now() + Duration::hours(23), now());

    let plan = harness.planner(&config).plan_notifications(task, now()).unwrap();
    assert_eq!(plan.created, 1);

    let pending = harness.store.list_pending_for_member(harness.members[0]).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, ReminderKind::OneDay);
    assert_eq!(pending[0].scheduled_at, now() + Duration::seconds(60));

    let sender = Arc::new(RecordingSender::default());
    let dispatcher = harness.dispatcher(&config, sender.clone());

    let tick = now() + Duration::minutes(2);
    let first = dispatcher.dispatch_due(tick).await.unwrap();
    assert_eq!(first.sent, 1);
    let row = harness.store.get_notification(pending[0].id).unwrap();
    assert_eq!(row.sent_at, Some(tick));

    let second = dispatcher.dispatch_due(tick + Duration::hours(6)).await.unwrap();
    assert_eq!(second.found, 0);
    assert_eq!(second.sent, 0);

    let sent = sender.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, address(0));
    assert!(sent[0].1.contains("📋 Task: Lab report"));
    assert!(sent[0].1.contains("Due tomorrow (16.09.2025 07:30)"));
    assert!(sent[0].1.contains("📝 Description: Lab report details"));
}

#[tokio::test]
async fn week_of_reminders_fire_in_order() {
    let harness = Harness::new(2);
    let config = ReminderConfig::default();
    let deadline = now() + Duration::days(8);
    let task = harness.create_task("Thesis draft", deadline, now());
    harness.planner(&config).plan_notifications(task, now()).unwrap();

    let sender = Arc::new(RecordingSender::default());
    let dispatcher = harness.dispatcher(&config, sender.clone());

    for days_before in [7, 3, 1] {
        let at = deadline - Duration::days(days_before);
        let report = dispatcher.dispatch_due(at).await.unwrap();
        assert_eq!(report.sent, 2, "{days_before} days before");
    }

    let texts: Vec<String> = sender.sent().into_iter().map(|(_, text)| text).collect();
    assert!(texts[0].contains("in a week"));
    assert!(texts[2].contains("in 3 days"));
    assert!(texts[4].contains("tomorrow"));
    for &member in &harness.members {
        assert!(harness.store.list_pending_for_member(member).unwrap().is_empty());
    }
}

#[tokio::test]
async fn sweep_runs_before_dispatch_and_overdue_tasks_still_deliver() {
    let harness = Harness::new(1);
    let config = ReminderConfig::default();
    let deadline = now() + Duration::hours(2);
    let task = harness.create_task("Slides", deadline, now() - Duration::days(3));
    harness.planner(&config).plan_notifications(task, now()).unwrap();

    let later = deadline + Duration::hours(1);
    let sweep = DeadlineStatusUpdater::new(harness.store.clone(), harness.store.clone())
        .update_statuses(later);
    assert_eq!(sweep.marked_overdue, 1);

    let stored = harness.store.get_task(task).unwrap();
    assert_eq!(stored.status, TaskStatus::Overdue);
    assert_eq!(stored.priority, TaskPriority::Critical);

    let sender = Arc::new(RecordingSender::default());
    let report = harness
        .dispatcher(&config, sender.clone())
        .dispatch_due(later)
        .await
        .unwrap();
    assert_eq!(report.sent, 1);
}

#[tokio::test]
async fn sent_state_survives_reopening_the_database() {
    let harness = Harness::new(1);
    let config = ReminderConfig::default();
    let task = harness.create_task("Exam prep", now() + Duration::days(2), now());
    harness.planner(&config).plan_notifications(task, now()).unwrap();

    let sender = Arc::new(RecordingSender::default());
    let at = now() + Duration::days(1);
    harness.dispatcher(&config, sender.clone()).dispatch_due(at).await.unwrap();
    assert_eq!(sender.sent().len(), 1);

    let reopened = SqliteTrackerStore::open(&harness.dir.path().join("nudge.db")).unwrap();
    assert!(reopened.list_ready_to_send(at + Duration::days(1), 0).unwrap().is_empty());
    assert!(reopened.list_pending_for_member(harness.members[0]).unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_task_removes_its_reminders() {
    let harness = Harness::new(3);
    let config = ReminderConfig::default();
    let task = harness.create_task("Group project", now() + Duration::days(10), now());
    let plan = harness.planner(&config).plan_notifications(task, now()).unwrap();
    assert_eq!(plan.created, 9);

    harness.store.delete_task(task).unwrap();

    let sender = Arc::new(RecordingSender::default());
    let report = harness
        .dispatcher(&config, sender.clone())
        .dispatch_due(now() + Duration::days(30))
        .await
        .unwrap();
    assert_eq!(report.found, 0);
    assert!(sender.sent().is_empty());
}
