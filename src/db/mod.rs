mod schema;
pub mod activity;
pub mod console;
pub mod dashboard;
pub mod introspect;
pub mod notes;
pub mod targets;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags, Row};
use serde_json::Value as JsonValue;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

pub use schema::{MIGRATIONS, SCHEMA};
pub use activity::ActivityEntry;
pub use console::{ConsoleError, ConsoleOutcome, QueryRows};
pub use dashboard::{DashboardSummary, StatusDetail, StatusSummary};
pub use introspect::{ColumnInfo, TableInfo};
pub use notes::Note;
pub use targets::{ClusterKind, ClusterMember, KanbanCard, StatusChange, TargetPin, ZipArea};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the live database file.
///
/// Connections are opened per operation through [`Db::open`]. The returned
/// [`DbConn`] holds the shared side of an in-process gate for as long as it
/// lives; replacing the file on disk takes the exclusive side through
/// [`Db::lock_exclusive`], so no request ever reads a half-swapped file.
pub struct Db {
    path: PathBuf,
    gate: RwLock<()>,
}

/// A connection scoped to one request. Closing happens on drop, on every exit path.
pub struct DbConn<'a> {
    // Declared before the guard so the connection closes first.
    conn: Connection,
    _gate: RwLockReadGuard<'a, ()>,
}

impl Deref for DbConn<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl DerefMut for DbConn<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl Db {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            gate: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn open(&self) -> Result<DbConn<'_>> {
        let gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        let conn = Connection::open(&self.path)
            .with_context(|| format!("Failed to open database {}", self.path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(DbConn { conn, _gate: gate })
    }

    /// Block every new [`DbConn`] until the guard is dropped.
    pub fn lock_exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the parent directory, the schema and any missing columns.
    pub fn initialize(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = self.open()?;
        conn.execute_batch(SCHEMA)?;
        for migration in MIGRATIONS {
            // "duplicate column name" on databases that already have it
            let _ = conn.execute(migration, []);
        }
        Ok(())
    }
}

/// Column `idx` as JSON, in whatever storage class the row holds it.
///
/// SQLite does not enforce declared column types, and restored or uploaded
/// databases carry whatever their writer stored. Projections decode
/// free-form columns through here instead of a fixed Rust type.
pub(crate) fn column_json(row: &Row<'_>, idx: usize) -> rusqlite::Result<JsonValue> {
    row.get_ref(idx).map(console::value_to_json)
}

/// Count the rows of `targets` in an arbitrary database file, read-only.
///
/// Used to check snapshot files without going through the gate. Fails for
/// files that are not SQLite databases or have no `targets` table.
pub fn count_targets_in(path: &Path) -> Result<i64> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("Failed to open {}", path.display()))?;
    let count = conn
        .query_row("SELECT COUNT(*) FROM targets", [], |row| row.get(0))
        .with_context(|| format!("Failed to count targets in {}", path.display()))?;
    Ok(count)
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_initialize_is_idempotent() {
        let dir = tempdir().unwrap();
        let db = fresh_db(dir.path());
        db.initialize().unwrap();

        let conn = db.open().unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('targets', 'zip_data', 'notes', 'activity_log')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 4);
    }

    #[test]
    fn test_count_targets_in() {
        let dir = tempdir().unwrap();
        let db = fresh_db(dir.path());
        seed_targets(&db, 3);

        assert_eq!(count_targets_in(db.path()).unwrap(), 3);
    }

    #[test]
    fn test_count_targets_in_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.db");
        std::fs::write(&path, b"definitely not sqlite, but long enough to have a header page").unwrap();

        assert!(count_targets_in(&path).is_err());
    }
}
