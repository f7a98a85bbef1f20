//! Database error classification

use locket_common::LocketError;
use sea_orm::{DbErr, SqlErr};
use tracing::error;

/// Message fragments of errors that retrying cannot fix: a missing table
/// (SQLite, MySQL, PostgreSQL wording) or a dead connection.
const UNRECOVERABLE_MARKERS: &[&str] = &[
    "no such table",
    "doesn't exist",
    "does not exist",
    "error communicating with database",
    "pool timed out",
    "closed pool",
];

/// Map a SeaORM error onto the Locket taxonomy
pub(crate) fn convert_db_err(err: DbErr) -> LocketError {
    let unrecoverable = match &err {
        DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => true,
        DbErr::Exec(_) | DbErr::Query(_) => {
            let message = err.to_string().to_lowercase();
            UNRECOVERABLE_MARKERS.iter().any(|m| message.contains(m))
        }
        _ => false,
    };

    if unrecoverable {
        error!(error = %err, "unrecoverable-database-error");
        return LocketError::Unrecoverable;
    }
    LocketError::Database(err.to_string())
}

/// Message fragments of transactions the engine aborted in favour of a
/// concurrent one: InnoDB deadlock (1213), PostgreSQL 40P01 and 40001.
const LOST_RACE_MARKERS: &[&str] = &[
    "deadlock",
    "could not serialize access",
    "serialization failure",
];

/// Whether an insert lost a race against a concurrent insert of the same key
pub(crate) fn is_duplicate_key(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Whether a lock transaction failed only because a concurrent writer on the
/// same key won, so re-reading and trying again can succeed
pub(crate) fn is_lost_race(err: &DbErr) -> bool {
    if is_duplicate_key(err) {
        return true;
    }
    match err {
        DbErr::Exec(_) | DbErr::Query(_) => {
            let message = err.to_string().to_lowercase();
            LOST_RACE_MARKERS.iter().any(|m| message.contains(m))
        }
        _ => false,
    }
}
