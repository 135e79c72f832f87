//! Reference-data snapshots: projects and work types.
//!
//! Each kind is stored as a full snapshot. [`Database::replace_all`] clears
//! the table and inserts the new set inside one transaction, so rows removed
//! upstream never survive and a failed replace leaves the previous snapshot
//! untouched.

use rusqlite::{params, Connection};

use crate::database::Database;
use crate::error::Result;
use crate::models::{CacheKind, Project, WorkType};

/// A record type that lives in a replace-all snapshot table.
pub trait CacheEntity: Sized {
    const KIND: CacheKind;

    /// Column list used by [`Database::get_all`], in `from_row` order.
    const COLUMNS: &'static str;

    fn insert(&self, conn: &Connection) -> rusqlite::Result<()>;

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self>;
}

impl CacheEntity for Project {
    const KIND: CacheKind = CacheKind::Project;
    const COLUMNS: &'static str = "id, name, code, description, status";

    fn insert(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO projects (id, name, code, description, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![self.id, self.name, self.code, self.description, self.status],
        )?;
        Ok(())
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Project {
            id: row.get(0)?,
            name: row.get(1)?,
            code: row.get(2)?,
            description: row.get(3)?,
            status: row.get(4)?,
        })
    }
}

impl CacheEntity for WorkType {
    const KIND: CacheKind = CacheKind::WorkType;
    const COLUMNS: &'static str = "id, name";

    fn insert(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO work_types (id, name) VALUES (?1, ?2)",
            params![self.id, self.name],
        )?;
        Ok(())
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(WorkType {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    }
}

impl Database {
    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Replace the whole snapshot of `T`'s kind with `items`.
    ///
    /// Returns the number of rows now stored.
    pub fn replace_all<T: CacheEntity>(&mut self, items: &[T]) -> Result<usize> {
        let kind = T::KIND;
        let table = kind.table();
        let tx = self.conn_mut().transaction()?;

        let cleared = tx.execute(&format!("DELETE FROM {table}"), [])?;
        for item in items {
            item.insert(&tx)?;
        }
        tx.commit()?;

        tracing::debug!(
            kind = %kind,
            cleared,
            inserted = items.len(),
            "replaced cache snapshot"
        );
        Ok(items.len())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// All cached records of `T`'s kind, ordered by name then id.
    pub fn get_all<T: CacheEntity>(&self) -> Result<Vec<T>> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY name ASC, id ASC",
            T::COLUMNS,
            T::KIND.table()
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map([], T::from_row)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    /// Number of cached records of the given kind.
    pub fn count(&self, kind: CacheKind) -> Result<i64> {
        let count = self.conn().query_row(
            &format!("SELECT COUNT(*) FROM {}", kind.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
