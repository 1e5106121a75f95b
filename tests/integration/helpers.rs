//! Shared helpers for integration tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nudge::config::ReminderConfig;
use nudge::reminders::NotificationSender;
use nudge::store::{GroupStore, TaskStore};
use nudge::tracker::{GroupId, MemberId, NewTask, TaskId};
use nudge::{
    DeadlineStatusUpdater, NotificationDispatcher, NotificationPlanner, ReminderScheduler,
    SqliteTrackerStore,
};

/// On-disk store in a temp dir with one group of `members` members.
pub(crate) struct Harness {
    pub dir: tempfile::TempDir,
    pub store: Arc<SqliteTrackerStore>,
    pub group: GroupId,
    pub members: Vec<MemberId>,
}

impl Harness {
    pub(crate) fn new(members: usize) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = Arc::new(
            SqliteTrackerStore::open(&dir.path().join("nudge.db")).expect("open store"),
        );
        let group = store.create_group("study group").expect("create group");
        let members = (0..members)
            .map(|i| {
                let id = store
                    .create_member(&address(i), &format!("student {i}"))
                    .expect("create member");
                store.add_member(group, id).expect("join group");
                id
            })
            .collect();
        Self {
            dir,
            store,
            group,
            members,
        }
    }

    pub(crate) fn create_task(&self, title: &str, deadline: DateTime<Utc>, now: DateTime<Utc>) -> TaskId {
        let task = NewTask::new(title, deadline, self.group, self.members[0], now)
            .with_description(format!("{title} details"));
        self.store.create_task(&task).expect("create task")
    }

    pub(crate) fn planner(&self, config: &ReminderConfig) -> NotificationPlanner {
        NotificationPlanner::new(
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
            config.clone(),
        )
    }

    pub(crate) fn dispatcher(
        &self,
        config: &ReminderConfig,
        sender: Arc<dyn NotificationSender>,
    ) -> Arc<NotificationDispatcher> {
        Arc::new(
            NotificationDispatcher::new(
                self.store.clone(),
                self.store.clone(),
                self.store.clone(),
                config.clone(),
            )
            .with_sender(sender),
        )
    }

    pub(crate) fn scheduler(
        &self,
        config: &ReminderConfig,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> ReminderScheduler {
        let updater = DeadlineStatusUpdater::new(self.store.clone(), self.store.clone());
        ReminderScheduler::new(updater, dispatcher, config.clone())
    }
}

/// External address of the `index`-th harness member.
pub(crate) fn address(index: usize) -> String {
    format!("+4470000{index:04}")
}

/// Sender that records every delivery.
#[derive(Default)]
pub(crate) struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSender {
    pub(crate) fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("sender lock").clone()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    fn id(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, address: &str, text: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .expect("sender lock")
            .push((address.to_owned(), text.to_owned()));
        Ok(())
    }
}

/// Poll `condition` every 10 ms for up to five seconds.
pub(crate) async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
