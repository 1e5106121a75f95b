//! Notification dispatcher.
//!
//! Each pass takes the notifications that are ready to send, claims each
//! one, renders the reminder text and hands it to the attached
//! [`NotificationSender`]. Successful rows get their sent instant. Failed
//! rows stay due for the next pass; a configured backoff and attempt budget
//! can space out and cap those retries.

use std::sync::{Arc, RwLock};

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::delay_from_secs;
use super::sender::NotificationSender;
use crate::config::ReminderConfig;
use crate::error::{NudgeError, Result};
use crate::store::{GroupStore, NotificationStore, TaskStore};
use crate::tracker::{MemberId, Notification, ReminderKind, Task, format_deadline};

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Rows returned by the ready-to-send query.
    pub found: usize,
    pub sent: usize,
    /// Delivery or bookkeeping failures.
    pub failed: usize,
    /// Rows claimed or sent by someone else in the meantime.
    pub skipped: usize,
}

/// Holds the sender capability.
///
/// Filled at construction or attached exactly once afterwards; reads and
/// the single write go through the same lock.
#[derive(Default)]
pub struct SenderSlot {
    inner: RwLock<Option<Arc<dyn NotificationSender>>>,
}

impl SenderSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(sender: Arc<dyn NotificationSender>) -> Self {
        Self {
            inner: RwLock::new(Some(sender)),
        }
    }

    /// Attach the sender.
    ///
    /// # Errors
    ///
    /// Returns [`NudgeError::Scheduler`] if a sender is already attached.
    pub fn attach(&self, sender: Arc<dyn NotificationSender>) -> Result<()> {
        let mut slot = self
            .inner
            .write()
            .map_err(|e| NudgeError::Scheduler(format!("sender slot poisoned: {e}")))?;
        if let Some(existing) = slot.as_ref() {
            return Err(NudgeError::Scheduler(format!(
                "sender already attached ({})",
                existing.id()
            )));
        }
        info!(sender = sender.id(), "notification sender attached");
        *slot = Some(sender);
        Ok(())
    }

    /// Current sender, if any.
    pub fn get(&self) -> Option<Arc<dyn NotificationSender>> {
        match self.inner.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.get().is_some()
    }
}

pub struct NotificationDispatcher {
    tasks: Arc<dyn TaskStore>,
    groups: Arc<dyn GroupStore>,
    notifications: Arc<dyn NotificationStore>,
    sender: SenderSlot,
    config: ReminderConfig,
    claimant: String,
}

impl NotificationDispatcher {
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
            sender: SenderSlot::new(),
            config,
            claimant: format!("dispatcher-{}", uuid::Uuid::new_v4()),
        }
    }

    /// Inject the sender at construction.
    #[must_use]
    pub fn with_sender(mut self, sender: Arc<dyn NotificationSender>) -> Self {
        self.sender = SenderSlot::with(sender);
        self
    }

    /// Attach the sender after construction. Only one attach is allowed.
    pub fn attach_sender(&self, sender: Arc<dyn NotificationSender>) -> Result<()> {
        self.sender.attach(sender)
    }

    pub fn has_sender(&self) -> bool {
        self.sender.is_attached()
    }

    /// Identifier written into claims taken by this dispatcher.
    pub fn claimant(&self) -> &str {
        &self.claimant
    }

    /// Notifications that a pass at `now` would try to send.
    pub fn preview_due(&self, now: DateTime<Utc>) -> Result<Vec<Notification>> {
        self.notifications
            .list_ready_to_send(now, self.config.max_send_attempts)
    }

    /// Unsent notifications for one member, earliest first.
    pub fn pending_for_member(&self, member: MemberId) -> Result<Vec<Notification>> {
        self.notifications.list_pending_for_member(member)
    }

    /// Run one dispatch pass as of `now`.
    ///
    /// A pass with reminders disabled or no sender attached does nothing.
    /// Claims and sent instants use `now` advanced by the time the pass has
    /// been running, so slow sends do not leave later rows with stale times.
    ///
    /// # Errors
    ///
    /// Returns an error only if the ready-to-send query fails. Per-row
    /// failures are logged and counted in the report.
    pub async fn dispatch_due(&self, now: DateTime<Utc>) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();
        if !self.config.enabled {
            debug!("reminders disabled, skipping dispatch");
            return Ok(report);
        }
        let Some(sender) = self.sender.get() else {
            info!("no notification sender attached, skipping dispatch");
            return Ok(report);
        };

        let due = self.preview_due(now)?;
        report.found = due.len();
        if due.is_empty() {
            debug!("no notifications due");
            return Ok(report);
        }

        let ttl = delay_from_secs(self.config.claim_ttl_secs);
        let started = Instant::now();
        let clock = || now + elapsed_since(started);
        for notification in &due {
            let id = notification.id;
            match self
                .notifications
                .claim_notification(id, &self.claimant, clock(), ttl)
            {
                Ok(true) => {}
                Ok(false) => {
                    debug!(notification_id = id, "claimed elsewhere, skipping");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(notification_id = id, "cannot claim notification: {e}");
                    report.failed += 1;
                    continue;
                }
            }

            let outcome = self.deliver(sender.as_ref(), notification).await;
            let at = clock();
            match outcome {
                Ok(()) => match self.notifications.mark_sent(id, at) {
                    Ok(true) => {
                        report.sent += 1;
                        debug!(notification_id = id, task_id = notification.task_id, "reminder sent");
                    }
                    Ok(false) => {
                        debug!(notification_id = id, "already marked sent");
                        report.skipped += 1;
                    }
                    Err(e) => {
                        error!(notification_id = id, "reminder delivered but not marked sent: {e}");
                        report.failed += 1;
                    }
                },
                Err(e) => {
                    self.record_failed_attempt(notification, &format!("{e:#}"), at);
                    report.failed += 1;
                }
            }
        }

        info!(
            found = report.found,
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            "dispatch pass finished"
        );
        Ok(report)
    }

    async fn deliver(
        &self,
        sender: &dyn NotificationSender,
        notification: &Notification,
    ) -> anyhow::Result<()> {
        let member = self
            .groups
            .get_member(notification.member_id)
            .context("resolving member")?;
        let task = self
            .tasks
            .get_task(notification.task_id)
            .context("resolving task")?;
        let text = render_message(&task, notification.kind);
        sender
            .send(&member.external_address, &text)
            .await
            .with_context(|| format!("{} sender", sender.id()))
    }

    fn record_failed_attempt(&self, notification: &Notification, reason: &str, now: DateTime<Utc>) {
        let id = notification.id;
        let next_attempt_at = now + self.backoff(notification.attempts.saturating_add(1));
        let attempts = match self.notifications.record_failure(id, reason, next_attempt_at) {
            Ok(attempts) => attempts,
            Err(e) => {
                error!(notification_id = id, "cannot record failed delivery: {e}");
                return;
            }
        };

        let max = self.config.max_send_attempts;
        if max > 0 && attempts >= max {
            warn!(notification_id = id, attempts, "giving up on reminder: {reason}");
        } else {
            warn!(notification_id = id, attempts, %next_attempt_at, "reminder delivery failed: {reason}");
        }
    }

    /// Delay before retry number `attempt` (1-based): base doubled per attempt, capped.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.config.retry_backoff_secs;
        let cap = self.config.retry_backoff_max_secs;
        let exponent = attempt.saturating_sub(1).min(32);
        let secs = base.saturating_mul(1_u64 << exponent).min(cap);
        delay_from_secs(secs)
    }
}

fn elapsed_since(started: Instant) -> Duration {
    Duration::from_std(started.elapsed()).unwrap_or_else(|_| Duration::zero())
}

/// Render the reminder text for one task.
#[must_use]
pub fn render_message(task: &Task, kind: ReminderKind) -> String {
    let mut text = format!(
        "🔔 Deadline reminder!\n\n📋 Task: {}\n⏰ Due {} ({})",
        task.title,
        kind.phrase(),
        format_deadline(task.deadline)
    );
    if !task.description.is_empty() {
        text.push_str("\n📝 Description: ");
        text.push_str(&task.description);
    }
    text
}
