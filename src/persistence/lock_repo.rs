//! Sent-notification idempotency lock repository.
//!
//! The lock is a single atomic insert against a unique triple
//! (reservation number, notification type, phone). A conflict means the
//! notification was already sent and must be skipped. There is no
//! check-then-insert path.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::Result;

use super::db::Database;
use super::{format_ts, is_unique_violation};

/// Repository wrapper around `SQLite` for notification locks.
#[derive(Clone)]
pub struct LockRepo {
    db: Arc<Database>,
}

impl LockRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Attempt to claim ownership of one notification send.
    ///
    /// Returns `true` when this caller owns the send, `false` when an
    /// identical notification was already claimed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` for any failure other than the expected
    /// unique-constraint conflict.
    pub async fn acquire(
        &self,
        reservation_number: &str,
        notification_type: &str,
        phone: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO sent_notification_lock (id, reservation_number,
             notification_type, phone, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(reservation_number)
        .bind(notification_type)
        .bind(phone)
        .bind(format_ts(Utc::now()))
        .execute(self.db.as_ref())
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) if is_unique_violation(&err) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
