//! Scheduler start/stop against a real database and the wall clock.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use nudge::NudgeError;
use nudge::config::ReminderConfig;
use nudge::store::{NotificationStore, TaskStore};
use nudge::tracker::TaskStatus;

use crate::helpers::{Harness, RecordingSender, wait_for};

#[tokio::test]
async fn running_scheduler_delivers_and_marks_overdue() {
    let harness = Harness::new(2);
    let config = ReminderConfig {
        check_interval_hours: 0.1,
        ..ReminderConfig::default()
    };
    let now = Utc::now();
    let late = harness.create_task("Late", now - Duration::minutes(30), now - Duration::days(2));
    let soon = harness.create_task("Soon", now + Duration::hours(20), now);
    let plan = harness.planner(&ReminderConfig {
        grace_delay_secs: 0,
        ..config.clone()
    });
    assert_eq!(plan.plan_notifications(soon, now).unwrap().created, 2);

    let sender = Arc::new(RecordingSender::default());
    let scheduler = harness.scheduler(&config, harness.dispatcher(&config, sender.clone()));
    scheduler.start().unwrap();
    assert_eq!(scheduler.period(), Some(StdDuration::from_secs(360)));

    wait_for(|| sender.sent().len() == 2).await;
    assert_eq!(harness.store.get_task(late).unwrap().status, TaskStatus::Overdue);

    scheduler.stop().await.unwrap();
    assert!(!scheduler.is_running());

    // Nothing left to send after the loop is gone.
    assert!(harness.store.list_ready_to_send(Utc::now(), 0).unwrap().is_empty());
}

#[tokio::test]
async fn lifecycle_misuse_is_reported() {
    let harness = Harness::new(1);
    let config = ReminderConfig::default();
    let sender = Arc::new(RecordingSender::default());
    let scheduler = harness.scheduler(&config, harness.dispatcher(&config, sender));

    scheduler.start().unwrap();
    let period = scheduler.period();
    assert!(matches!(scheduler.start(), Err(NudgeError::Scheduler(_))));
    assert_eq!(scheduler.period(), period);

    scheduler.stop().await.unwrap();
    assert!(matches!(scheduler.stop().await, Err(NudgeError::Scheduler(_))));
}

#[tokio::test]
async fn manual_cycle_waits_for_running_loop() {
    let harness = Harness::new(1);
    let config = ReminderConfig::default();
    let now = Utc::now();
    let task = harness.create_task("Manual", now + Duration::days(10), now);
    let planner = harness.planner(&config);
    let member = harness.members[0];
    planner
        .schedule_test_notification(member, task, Duration::zero(), now)
        .unwrap()
        .expect("fresh reminder");

    let sender = Arc::new(RecordingSender::default());
    let scheduler = harness.scheduler(&config, harness.dispatcher(&config, sender.clone()));
    scheduler.start().unwrap();

    // Whichever of the initial cycle and this manual one runs first sends it.
    let manual = scheduler.run_check_cycle().await;
    wait_for(|| sender.sent().len() == 1).await;
    assert!(manual.dispatch.sent <= 1);
    assert_eq!(sender.sent().len(), 1);

    scheduler.stop().await.unwrap();
}
