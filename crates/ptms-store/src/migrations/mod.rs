//! Schema migrations, tracked through SQLite's `user_version` pragma.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Step = fn(&Connection) -> rusqlite::Result<()>;

/// Ordered migration steps; the version after step `i` is `i + 1`.
const STEPS: &[(&str, Step)] = &[("v001_initial", v001_initial::up)];

/// Schema version of a fully migrated cache.
pub const CURRENT_VERSION: u32 = STEPS.len() as u32;

/// Bring the schema up to [`CURRENT_VERSION`]. Each step commits together
/// with its version bump.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let found: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if found > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "cache schema v{found} is newer than supported v{CURRENT_VERSION}"
        )));
    }

    for (index, (name, step)) in STEPS.iter().enumerate().skip(found as usize) {
        let version = index as u32 + 1;
        tracing::info!(migration = *name, version, "applying cache migration");

        let tx = conn.transaction()?;
        step(&tx).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
    }
    Ok(())
}
