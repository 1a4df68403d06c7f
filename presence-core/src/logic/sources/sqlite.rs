//! Read-only SQLite access shared by the forensic and telemetry sources

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, OpenFlags};

use crate::error::{PresenceError, Result};

/// Set before any query; a reader must never write to the source
const READ_ONLY_PRAGMAS: &str = "PRAGMA query_only = ON;
     PRAGMA temp_store = 2;
     PRAGMA journal_mode = OFF;";

fn connect(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.execute_batch(READ_ONLY_PRAGMAS)?;
    Ok(conn)
}

/// Open a database file read-only and lock it down
pub fn open_read_only(path: &Path) -> Result<Connection> {
    connect(path).map_err(|e| PresenceError::SourceUnavailable(format!("{}: {}", path.display(), e)))
}

/// Open, lock down and run `op` on a fresh connection; a lock hit anywhere
/// in there (pragmas included) gets the single retry
pub fn with_read_only<T, F>(path: &Path, delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut(&Connection) -> rusqlite::Result<T>,
{
    retry_once_on_lock(delay, || {
        let conn = connect(path)?;
        op(&conn)
    })
    .map_err(|e| match e {
        PresenceError::SourceUnavailable(msg) => {
            PresenceError::SourceUnavailable(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

/// Busy/locked database, worth one more try
pub fn is_lock_contention(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// Run `op`, and run it exactly once more after `delay` if the database was locked
pub fn retry_once_on_lock<T, F>(delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> rusqlite::Result<T>,
{
    match op() {
        Err(e) if is_lock_contention(&e) => {
            log::warn!("Database locked ({}), retrying in {:?}", e, delay);
            std::thread::sleep(delay);
            op().map_err(|e| PresenceError::SourceUnavailable(format!("after retry: {}", e)))
        }
        other => other.map_err(PresenceError::from),
    }
}

/// Errors reading one column are about that row only
pub fn is_row_level(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::Utf8Error(_)
    )
}

pub fn row_error(err: rusqlite::Error) -> PresenceError {
    if is_row_level(&err) {
        PresenceError::SourceCorrupt(err.to_string())
    } else {
        PresenceError::from(err)
    }
}
