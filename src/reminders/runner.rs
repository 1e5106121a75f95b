//! Reminder scheduler background loop.
//!
//! Spawns a tokio task that runs one check cycle right away and then one per
//! resolved period. A check cycle is the status sweep followed by a
//! dispatch pass. Cycles never overlap: the loop runs them inline and manual
//! triggers wait on the same gate.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::dispatcher::{DispatchReport, NotificationDispatcher};
use super::interval::resolve_period;
use super::status::{DeadlineStatusUpdater, SweepReport};
use crate::config::ReminderConfig;
use crate::error::{NudgeError, Result};

/// Outcome of one check cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub sweep: SweepReport,
    pub dispatch: DispatchReport,
}

/// Status sweep plus dispatch, serialized behind an async gate.
struct CheckCycle {
    updater: Arc<DeadlineStatusUpdater>,
    dispatcher: Arc<NotificationDispatcher>,
    gate: tokio::sync::Mutex<()>,
}

impl CheckCycle {
    async fn run(&self) -> CycleReport {
        let _gate = self.gate.lock().await;
        let now = Utc::now();

        // The sweep is synchronous store work; keep it off the async workers.
        let updater = Arc::clone(&self.updater);
        let sweep = match tokio::task::spawn_blocking(move || updater.update_statuses(now)).await {
            Ok(report) => report,
            Err(e) => {
                error!("status sweep task failed: {e}");
                SweepReport {
                    failures: 1,
                    ..SweepReport::default()
                }
            }
        };
        let dispatch = match self.dispatcher.dispatch_due(now).await {
            Ok(report) => report,
            Err(e) => {
                error!("dispatch pass failed: {e}");
                DispatchReport::default()
            }
        };

        info!(
            groups = sweep.groups,
            marked_overdue = sweep.marked_overdue,
            reprioritized = sweep.reprioritized,
            sent = dispatch.sent,
            failed = dispatch.failed + sweep.failures,
            "reminder check cycle finished"
        );
        CycleReport { sweep, dispatch }
    }
}

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    period: Duration,
}

/// Start/stop state machine around the periodic check cycle.
pub struct ReminderScheduler {
    cycle: Arc<CheckCycle>,
    config: ReminderConfig,
    running: Mutex<Option<RunningLoop>>,
}

impl ReminderScheduler {
    pub fn new(
        updater: DeadlineStatusUpdater,
        dispatcher: Arc<NotificationDispatcher>,
        config: ReminderConfig,
    ) -> Self {
        Self {
            cycle: Arc::new(CheckCycle {
                updater: Arc::new(updater),
                dispatcher,
                gate: tokio::sync::Mutex::new(()),
            }),
            config,
            running: Mutex::new(None),
        }
    }

    /// Dispatcher used by the loop, e.g. to attach a sender late.
    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.cycle.dispatcher
    }

    /// Start the background loop on the current tokio runtime.
    ///
    /// With reminders disabled this logs and returns `Ok` without starting.
    ///
    /// # Errors
    ///
    /// Returns [`NudgeError::Scheduler`] if the loop is already running or
    /// there is no tokio runtime to spawn it on.
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| NudgeError::Scheduler(format!("no tokio runtime: {e}")))?;
        let mut running = self.lock_state()?;
        if running.is_some() {
            return Err(NudgeError::Scheduler("reminder scheduler already running".into()));
        }
        if !self.config.enabled {
            info!("reminders disabled, scheduler not started");
            return Ok(());
        }

        let period = resolve_period(self.config.check_interval_hours);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let cycle = Arc::clone(&self.cycle);

        let handle = runtime.spawn(async move {
            info!(period_secs = period.as_secs_f64(), "reminder scheduler started");
            cycle.run().await;

            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => {
                        cycle.run().await;
                    }
                }
            }
            info!("reminder scheduler stopped");
        });

        *running = Some(RunningLoop {
            cancel,
            handle,
            period,
        });
        Ok(())
    }

    /// Stop the loop and wait for it to exit. An in-flight cycle finishes first.
    ///
    /// # Errors
    ///
    /// Returns [`NudgeError::Scheduler`] if the loop is not running.
    pub async fn stop(&self) -> Result<()> {
        let stopping = self
            .lock_state()?
            .take()
            .ok_or_else(|| NudgeError::Scheduler("reminder scheduler not running".into()))?;

        stopping.cancel.cancel();
        if let Err(e) = stopping.handle.await {
            error!("reminder scheduler task ended abnormally: {e}");
        }
        debug!("reminder scheduler joined");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.lock_state().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Period of the running loop.
    pub fn period(&self) -> Option<Duration> {
        self.lock_state()
            .ok()
            .and_then(|s| s.as_ref().map(|r| r.period))
    }

    /// Run one check cycle now, outside the timer.
    pub async fn run_check_cycle(&self) -> CycleReport {
        self.cycle.run().await
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, Option<RunningLoop>>> {
        self.running
            .lock()
            .map_err(|e| NudgeError::Scheduler(format!("scheduler state poisoned: {e}")))
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock()
            && let Some(running) = running.take()
        {
            running.cancel.cancel();
        }
    }
}
