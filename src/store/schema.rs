//! SQLite DDL definitions for the tracker store.
//!
//! All `CREATE TABLE` / `CREATE INDEX` statements live here so they are
//! reviewable and testable in isolation.

use rusqlite::Connection;

pub(crate) const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Complete DDL for the tracker database.
///
/// Uses `IF NOT EXISTS` throughout so `apply_schema` is idempotent.
pub(crate) const SCHEMA_SQL: &str = r#"
-- Enable WAL mode for concurrent reads during writes.
PRAGMA journal_mode = WAL;

-- Enforce foreign key constraints (cascade notification cleanup).
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS members (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    external_address TEXT NOT NULL UNIQUE,
    display_name     TEXT NOT NULL DEFAULT '',
    created_at       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS task_groups (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS group_members (
    group_id  INTEGER NOT NULL REFERENCES task_groups(id) ON DELETE CASCADE,
    member_id INTEGER NOT NULL REFERENCES members(id) ON DELETE CASCADE,
    joined_at INTEGER NOT NULL,
    PRIMARY KEY (group_id, member_id)
);

CREATE TABLE IF NOT EXISTS tasks (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    title       TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    deadline    INTEGER NOT NULL,
    priority    TEXT NOT NULL DEFAULT 'normal'
                CHECK (priority IN ('low', 'normal', 'high', 'critical')),
    status      TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'completed', 'overdue')),
    group_id    INTEGER NOT NULL REFERENCES task_groups(id) ON DELETE CASCADE,
    created_by  INTEGER NOT NULL,
    assigned_to INTEGER,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_group    ON tasks(group_id);
CREATE INDEX IF NOT EXISTS idx_tasks_deadline ON tasks(deadline);

-- One row per (member, task, reminder kind); re-planning is an upsert no-op.
CREATE TABLE IF NOT EXISTS notifications (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    member_id       INTEGER NOT NULL REFERENCES members(id) ON DELETE CASCADE,
    task_id         INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    kind            TEXT NOT NULL CHECK (kind IN ('1day', '3days', '1week')),
    scheduled_at    INTEGER NOT NULL,
    sent_at         INTEGER,
    attempts        INTEGER NOT NULL DEFAULT 0,
    last_error      TEXT,
    next_attempt_at INTEGER,
    claimed_by      TEXT,
    claimed_until   INTEGER,
    created_at      INTEGER NOT NULL,
    UNIQUE (member_id, task_id, kind)
);

CREATE INDEX IF NOT EXISTS idx_notifications_ready  ON notifications(scheduled_at, sent_at);
CREATE INDEX IF NOT EXISTS idx_notifications_member ON notifications(member_id);
"#;

/// Apply the full schema to an open connection.
///
/// Safe to call multiple times. Seeds the schema version on a fresh database.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    let version_str = CURRENT_SCHEMA_VERSION.to_string();
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![version_str],
    )?;

    Ok(())
}

/// Read the current schema version from the database.
///
/// Returns `None` if the key is missing.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().ok())
        }
        None => Ok(None),
    }
}
