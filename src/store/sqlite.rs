//! SQLite-backed tracker store.
//!
//! One database file holds members, groups, tasks and notifications.
//! Implements [`TaskStore`], [`NotificationStore`] and [`GroupStore`].

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::warn;

use super::schema::{apply_schema, read_schema_version};
use super::{GroupStore, NotificationStore, TaskStore};
use crate::error::{NudgeError, Result};
use crate::tracker::{
    Group, GroupId, Member, MemberId, NewNotification, NewTask, Notification, NotificationId,
    ReminderKind, Task, TaskId, TaskPriority, TaskStatus, from_epoch_secs, to_epoch_secs,
};

const TASK_COLUMNS: &str = "id, title, description, deadline, priority, status, group_id, \
                            created_by, assigned_to, created_at, updated_at";

const NOTIFICATION_COLUMNS: &str = "id, member_id, task_id, kind, scheduled_at, sent_at, \
                                    attempts, last_error, next_attempt_at, created_at";

/// SQLite-backed tracker store.
///
/// Thread-safe via an internal `Mutex<Connection>`. Every statement is a
/// single-row or single-query operation; there are no multi-step transactions.
pub struct SqliteTrackerStore {
    conn: Mutex<Connection>,
}

impl SqliteTrackerStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> std::result::Result<Self, SqliteStoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| SqliteStoreError::Io(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Fresh private in-memory database.
    pub fn open_in_memory() -> std::result::Result<Self, SqliteStoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> std::result::Result<Self, SqliteStoreError> {
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Read the current schema version from the database.
    pub fn schema_version(&self) -> std::result::Result<Option<u32>, SqliteStoreError> {
        let conn = self.lock()?;
        Ok(read_schema_version(&conn)?)
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Acquire the connection mutex.
    fn lock(&self) -> std::result::Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.conn
            .lock()
            .map_err(|e| SqliteStoreError::Lock(e.to_string()))
    }

    fn query_tasks<P: rusqlite::Params>(&self, where_clause: &str, params: P) -> Result<Vec<Task>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE {where_clause} ORDER BY deadline, id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params, row_to_task)?;
        collect_readable(rows)
    }

    fn query_notifications<P: rusqlite::Params>(
        &self,
        where_clause: &str,
        params: P,
    ) -> Result<Vec<Notification>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE {where_clause} \
             ORDER BY scheduled_at, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params, row_to_notification)?;
        collect_readable(rows)
    }

    fn notification_exists(conn: &Connection, id: NotificationId) -> Result<bool> {
        let found = conn
            .query_row(
                "SELECT 1 FROM notifications WHERE id = ?1",
                params![id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Run raw SQL with CHECK constraints off, to plant rows the schema rejects.
    #[cfg(test)]
    pub(crate) fn execute_unchecked(&self, sql: &str) {
        let conn = self.lock().expect("connection lock");
        conn.execute_batch(&format!(
            "PRAGMA ignore_check_constraints = ON; {sql}; PRAGMA ignore_check_constraints = OFF;"
        ))
        .expect("raw sql");
    }
}

impl TaskStore for SqliteTrackerStore {
    fn create_task(&self, task: &NewTask) -> Result<TaskId> {
        let conn = self.lock()?;
        let now = to_epoch_secs(Utc::now());
        conn.execute(
            "INSERT INTO tasks \
             (title, description, deadline, priority, status, group_id, created_by, \
              assigned_to, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7, ?8, ?9)",
            params![
                task.title,
                task.description,
                to_epoch_secs(task.deadline),
                task.priority.as_str(),
                task.group_id,
                task.created_by,
                task.assigned_to,
                now,
                now
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_task(&self, id: TaskId) -> Result<Task> {
        let conn = self.lock()?;
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
        conn.query_row(&sql, params![id], row_to_task)
            .optional()?
            .ok_or_else(|| NudgeError::NotFound(format!("task {id}")))
    }

    fn list_tasks_by_group(&self, group: GroupId) -> Result<Vec<Task>> {
        self.query_tasks("group_id = ?1", params![group])
    }

    fn list_tasks_by_status(&self, group: GroupId, status: TaskStatus) -> Result<Vec<Task>> {
        self.query_tasks(
            "group_id = ?1 AND status = ?2",
            params![group, status.as_str()],
        )
    }

    fn list_tasks_by_priority(&self, group: GroupId, priority: TaskPriority) -> Result<Vec<Task>> {
        self.query_tasks(
            "group_id = ?1 AND priority = ?2",
            params![group, priority.as_str()],
        )
    }

    fn list_tasks_by_deadline_range(
        &self,
        group: GroupId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Task>> {
        self.query_tasks(
            "group_id = ?1 AND deadline BETWEEN ?2 AND ?3",
            params![group, to_epoch_secs(from), to_epoch_secs(to)],
        )
    }

    fn list_overdue_tasks(&self, group: GroupId, now: DateTime<Utc>) -> Result<Vec<Task>> {
        self.query_tasks(
            "group_id = ?1 AND deadline < ?2 AND status != 'completed'",
            params![group, to_epoch_secs(now)],
        )
    }

    fn update_task_status(&self, id: TaskId, status: TaskStatus) -> Result<()> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), to_epoch_secs(Utc::now()), id],
        )?;
        if rows == 0 {
            return Err(NudgeError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    fn update_task_priority(&self, id: TaskId, priority: TaskPriority) -> Result<()> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE tasks SET priority = ?1, updated_at = ?2 WHERE id = ?3",
            params![priority.as_str(), to_epoch_secs(Utc::now()), id],
        )?;
        if rows == 0 {
            return Err(NudgeError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    fn delete_task(&self, id: TaskId) -> Result<()> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(NudgeError::NotFound(format!("task {id}")));
        }
        Ok(())
    }
}

impl NotificationStore for SqliteTrackerStore {
    fn create_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<Option<NotificationId>> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "INSERT INTO notifications (member_id, task_id, kind, scheduled_at, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT (member_id, task_id, kind) DO NOTHING",
            params![
                notification.member_id,
                notification.task_id,
                notification.kind.as_str(),
                to_epoch_secs(notification.scheduled_at),
                to_epoch_secs(Utc::now())
            ],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        Ok(Some(conn.last_insert_rowid()))
    }

    fn get_notification(&self, id: NotificationId) -> Result<Notification> {
        let conn = self.lock()?;
        let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1");
        conn.query_row(&sql, params![id], row_to_notification)
            .optional()?
            .ok_or_else(|| NudgeError::NotFound(format!("notification {id}")))
    }

    fn list_ready_to_send(
        &self,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Vec<Notification>> {
        self.query_notifications(
            "scheduled_at <= ?1 AND sent_at IS NULL \
             AND (claimed_until IS NULL OR claimed_until <= ?1) \
             AND (next_attempt_at IS NULL OR next_attempt_at <= ?1) \
             AND (?2 = 0 OR attempts < ?2)",
            params![to_epoch_secs(now), max_attempts],
        )
    }

    fn list_pending_for_member(&self, member: MemberId) -> Result<Vec<Notification>> {
        self.query_notifications("member_id = ?1 AND sent_at IS NULL", params![member])
    }

    fn claim_notification(
        &self,
        id: NotificationId,
        claimant: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let now_secs = to_epoch_secs(now);
        let rows = conn.execute(
            "UPDATE notifications SET claimed_by = ?1, claimed_until = ?2 \
             WHERE id = ?3 AND sent_at IS NULL \
             AND (claimed_until IS NULL OR claimed_until <= ?4)",
            params![claimant, to_epoch_secs(now + ttl), id, now_secs],
        )?;
        Ok(rows == 1)
    }

    fn mark_sent(&self, id: NotificationId, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE notifications SET sent_at = ?1, claimed_by = NULL, claimed_until = NULL \
             WHERE id = ?2 AND sent_at IS NULL",
            params![to_epoch_secs(at), id],
        )?;
        if rows == 1 {
            return Ok(true);
        }
        if Self::notification_exists(&conn, id)? {
            Ok(false)
        } else {
            Err(NudgeError::NotFound(format!("notification {id}")))
        }
    }

    fn record_failure(
        &self,
        id: NotificationId,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<u32> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE notifications SET attempts = attempts + 1, last_error = ?1, \
             next_attempt_at = ?2, claimed_by = NULL, claimed_until = NULL \
             WHERE id = ?3",
            params![error, to_epoch_secs(next_attempt_at), id],
        )?;
        if rows == 0 {
            return Err(NudgeError::NotFound(format!("notification {id}")));
        }
        let attempts: u32 = conn.query_row(
            "SELECT attempts FROM notifications WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(attempts)
    }

    fn delete_notifications_for_task(&self, task: TaskId) -> Result<usize> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM notifications WHERE task_id = ?1", params![task])?;
        Ok(rows)
    }
}

impl GroupStore for SqliteTrackerStore {
    fn create_group(&self, name: &str) -> Result<GroupId> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO task_groups (name, created_at) VALUES (?1, ?2)",
            params![name, to_epoch_secs(Utc::now())],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn create_member(&self, external_address: &str, display_name: &str) -> Result<MemberId> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO members (external_address, display_name, created_at) VALUES (?1, ?2, ?3)",
            params![external_address, display_name, to_epoch_secs(Utc::now())],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_member(&self, id: MemberId) -> Result<Member> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, external_address, display_name, created_at FROM members WHERE id = ?1",
            params![id],
            row_to_member,
        )
        .optional()?
        .ok_or_else(|| NudgeError::NotFound(format!("member {id}")))
    }

    fn add_member(&self, group: GroupId, member: MemberId) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO group_members (group_id, member_id, joined_at) \
             VALUES (?1, ?2, ?3)",
            params![group, member, to_epoch_secs(Utc::now())],
        )?;
        Ok(())
    }

    fn list_groups(&self) -> Result<Vec<Group>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, name, created_at FROM task_groups ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Group {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: from_epoch_secs(row.get(2)?),
            })
        })?;

        let mut groups = Vec::new();
        for r in rows {
            groups.push(r?);
        }
        Ok(groups)
    }

    fn list_members(&self, group: GroupId) -> Result<Vec<Member>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT m.id, m.external_address, m.display_name, m.created_at \
             FROM members m JOIN group_members gm ON gm.member_id = m.id \
             WHERE gm.group_id = ?1 ORDER BY m.id",
        )?;
        let rows = stmt.query_map(params![group], row_to_member)?;

        let mut members = Vec::new();
        for r in rows {
            members.push(r?);
        }
        Ok(members)
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from the SQLite backend.
#[derive(Debug, thiserror::Error)]
pub enum SqliteStoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("row not found: {0}")]
    NotFound(String),

    #[error("lock poisoned: {0}")]
    Lock(String),

    #[error("{table} row {id}: unrecognised {column} {value:?}")]
    InvalidValue {
        table: &'static str,
        id: i64,
        column: &'static str,
        value: String,
    },
}

impl From<SqliteStoreError> for NudgeError {
    fn from(e: SqliteStoreError) -> Self {
        match e {
            SqliteStoreError::NotFound(what) => NudgeError::NotFound(what),
            other => NudgeError::Store(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for NudgeError {
    fn from(e: rusqlite::Error) -> Self {
        SqliteStoreError::Sqlite(e).into()
    }
}

// ---------------------------------------------------------------------------
// Row conversion helpers
// ---------------------------------------------------------------------------

/// Gather mapped rows, dropping the ones whose stored values do not parse.
///
/// A row with an unknown status, priority or kind is logged and left out
/// rather than read as some default and written back.
fn collect_readable<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for r in rows {
        match r {
            Ok(item) => out.push(item),
            Err(rusqlite::Error::FromSqlConversionFailure(_, _, e)) => {
                warn!("skipping unreadable row: {e}");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(out)
}

fn parse_text<T>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    match parse(&raw) {
        Some(value) => Ok(value),
        None => Err(rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(SqliteStoreError::InvalidValue {
                table,
                id: row.get(0)?,
                column,
                value: raw,
            }),
        )),
    }
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        deadline: from_epoch_secs(row.get(3)?),
        priority: parse_text(row, 4, "tasks", "priority", TaskPriority::parse)?,
        status: parse_text(row, 5, "tasks", "status", TaskStatus::parse)?,
        group_id: row.get(6)?,
        created_by: row.get(7)?,
        assigned_to: row.get(8)?,
        created_at: from_epoch_secs(row.get(9)?),
        updated_at: from_epoch_secs(row.get(10)?),
    })
}

fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let sent_at: Option<i64> = row.get(5)?;
    let next_attempt_at: Option<i64> = row.get(8)?;

    Ok(Notification {
        id: row.get(0)?,
        member_id: row.get(1)?,
        task_id: row.get(2)?,
        kind: parse_text(row, 3, "notifications", "kind", ReminderKind::parse)?,
        scheduled_at: from_epoch_secs(row.get(4)?),
        sent_at: sent_at.map(from_epoch_secs),
        attempts: row.get(6)?,
        last_error: row.get(7)?,
        next_attempt_at: next_attempt_at.map(from_epoch_secs),
        created_at: from_epoch_secs(row.get(9)?),
    })
}

fn row_to_member(row: &rusqlite::Row<'_>) -> rusqlite::Result<Member> {
    Ok(Member {
        id: row.get(0)?,
        external_address: row.get(1)?,
        display_name: row.get(2)?,
        created_at: from_epoch_secs(row.get(3)?),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
