//! End-to-end delivery through the webhook sender against a mock server.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use nudge::config::ReminderConfig;
use nudge::reminders::WebhookSender;
use nudge::store::NotificationStore;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::Harness;

#[tokio::test]
async fn planned_reminders_are_posted_to_the_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notify"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;

    let harness = Harness::new(2);
    let config = ReminderConfig::default();
    let now = Utc::now();
    let task = harness.create_task("Essay", now + Duration::hours(12), now);
    harness.planner(&config).plan_notifications(task, now).unwrap();

    let sender = WebhookSender::new(format!("{}/notify", server.uri()), StdDuration::from_secs(5))
        .unwrap();
    let dispatcher = harness.dispatcher(&config, Arc::new(sender));
    let report = dispatcher.dispatch_due(now + Duration::minutes(5)).await.unwrap();
    assert_eq!(report.sent, 2);

    let requests = server.received_requests().await.unwrap();
    let bodies: Vec<serde_json::Value> = requests
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    let addresses: Vec<&str> = bodies
        .iter()
        .map(|b| b["address"].as_str().unwrap())
        .collect();
    assert_eq!(addresses, vec![crate::helpers::address(0), crate::helpers::address(1)]);
    assert!(bodies[0]["text"].as_str().unwrap().contains("Essay"));
}

#[tokio::test]
async fn rejected_webhook_leaves_reminder_for_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down for maintenance"))
        .mount(&server)
        .await;

    let harness = Harness::new(1);
    let config = ReminderConfig::default();
    let now = Utc::now();
    let task = harness.create_task("Essay", now + Duration::hours(12), now);
    harness.planner(&config).plan_notifications(task, now).unwrap();

    let sender = WebhookSender::new(server.uri(), StdDuration::from_secs(5)).unwrap();
    let dispatcher = harness.dispatcher(&config, Arc::new(sender));
    let tick = now + Duration::minutes(5);
    let report = dispatcher.dispatch_due(tick).await.unwrap();
    assert_eq!(report.failed, 1);

    let pending = harness
        .store
        .list_pending_for_member(harness.members[0])
        .unwrap();
    assert_eq!(pending.len(), 1);
    let row = &pending[0];
    assert_eq!(row.attempts, 1);
    assert!(row.sent_at.is_none());
    assert!(row.last_error.as_deref().unwrap().contains("500"));
    assert!(row.next_attempt_at.unwrap() <= tick + Duration::seconds(1));

    // No backoff by default: the next tick tries again.
    let next_tick = tick + Duration::minutes(6);
    let again = dispatcher.dispatch_due(next_tick).await.unwrap();
    assert_eq!(again.found, 1);
    assert_eq!(again.failed, 1);
    let row = harness.store.get_notification(row.id).unwrap();
    assert_eq!(row.attempts, 2);
}
