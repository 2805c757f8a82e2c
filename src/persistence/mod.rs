//! Persistence layer modules.

pub mod db;
pub mod event_repo;
pub mod lock_repo;
pub mod message_log_repo;
pub mod schedule_repo;
pub mod schema;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{AppError, Result};

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;

/// Format a timestamp for storage.
///
/// Fixed-width microseconds with a `Z` suffix so that lexicographic
/// comparison of stored values is chronological.
#[must_use]
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp back into UTC.
///
/// # Errors
///
/// Returns `AppError::Db` if the value is not valid RFC 3339.
pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| AppError::Db(format!("invalid timestamp '{raw}': {err}")))
}

/// Whether an `sqlx` error is a unique-constraint violation.
///
/// Dedup inserts and idempotency locks treat this as a normal outcome,
/// never as a failure.
#[must_use]
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
