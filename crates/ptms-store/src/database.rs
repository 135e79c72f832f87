//! The cache database handle.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

const DB_FILE_NAME: &str = "ptms.db";

/// Owner of the single SQLite connection of the local cache.
///
/// Writers that must be atomic (`replace_all`, `set_prefs`) take `&mut self`,
/// so sharing the handle as `Arc<Mutex<Database>>` serializes them and keeps
/// readers from observing a half-applied snapshot.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the cache at `path`, or at [`Database::default_path`] when `None`.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::open_at(path),
            None => Self::open_at(&Self::default_path()?),
        }
    }

    /// `ptms.db` inside the platform data directory, e.g.
    /// `~/.local/share/ptms` on Linux.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "ptms", "ptms").ok_or(StoreError::NoDataDir)?;
        Ok(dirs.data_dir().join(DB_FILE_NAME))
    }

    /// Open (or create) the cache file at `path` and migrate it.
    pub fn open_at(path: &Path) -> Result<Self> {
        match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)?,
            _ => {}
        }

        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_migrations(&mut conn)?;

        tracing::info!(path = %path.display(), "cache database ready");
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Mutable access, needed to open transactions.
    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }
}
