//! v001 -- Initial schema creation.
//!
//! Creates the key-value `preferences` table and the snapshot tables
//! `projects`, `work_types` and `time_reports`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Preferences (bootstrap marker, session, offline credential)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS preferences (
    key        TEXT PRIMARY KEY NOT NULL,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL                 -- RFC-3339
);

-- ----------------------------------------------------------------
-- Projects (replaced wholesale on every sync)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS projects (
    id          INTEGER PRIMARY KEY NOT NULL,  -- server id
    name        TEXT NOT NULL,
    code        TEXT,
    description TEXT,
    status      TEXT
);

-- ----------------------------------------------------------------
-- Work types (replaced wholesale on every sync)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS work_types (
    id   INTEGER PRIMARY KEY NOT NULL,         -- server id
    name TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Time reports
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS time_reports (
    id           INTEGER PRIMARY KEY NOT NULL, -- server id
    owner_id     INTEGER NOT NULL,
    project_id   INTEGER NOT NULL,
    work_type_id INTEGER NOT NULL,
    work_date    TEXT NOT NULL,                -- YYYY-MM-DD
    hours        REAL NOT NULL CHECK (hours >= 0),
    description  TEXT
);

CREATE INDEX IF NOT EXISTS idx_time_reports_owner_date
    ON time_reports(owner_id, work_date DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}
