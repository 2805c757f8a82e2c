//! Inbound event repository for `SQLite` persistence.
//!
//! The insert is the authoritative dedup gate: the unique index on
//! `external_event_id` makes a duplicate arrival fail the insert, and that
//! conflict is reported as a normal outcome.

use std::sync::Arc;

use crate::models::event::InboundEvent;
use crate::Result;

use super::db::Database;
use super::{format_ts, is_unique_violation, parse_ts};

/// Repository wrapper around `SQLite` for inbound event records.
#[derive(Clone)]
pub struct EventRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    external_event_id: String,
    event_name: String,
    phone: Option<String>,
    payload_json: String,
    created_at: String,
}

impl EventRow {
    fn into_event(self) -> Result<InboundEvent> {
        Ok(InboundEvent {
            id: self.id,
            external_event_id: self.external_event_id,
            event_name: self.event_name,
            phone: self.phone,
            payload_json: self.payload_json,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

impl EventRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert an event record unless its external id was already processed.
    ///
    /// Returns `true` when the record was inserted, `false` when the unique
    /// constraint rejected it (duplicate event, idempotent no-op).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` for any failure other than the expected
    /// unique-constraint conflict.
    pub async fn insert_if_absent(&self, event: &InboundEvent) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO inbound_event (id, external_event_id, event_name, phone,
             payload_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&event.id)
        .bind(&event.external_event_id)
        .bind(&event.event_name)
        .bind(&event.phone)
        .bind(&event.payload_json)
        .bind(format_ts(event.created_at))
        .execute(self.db.as_ref())
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) if is_unique_violation(&err) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Retrieve an event by its external identifier.
    ///
    /// Returns `Ok(None)` if no such event was recorded.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_external_id(&self, external_event_id: &str) -> Result<Option<InboundEvent>> {
        let row: Option<EventRow> =
            sqlx::query_as("SELECT * FROM inbound_event WHERE external_event_id = ?1")
                .bind(external_event_id)
                .fetch_optional(self.db.as_ref())
                .await?;

        row.map(EventRow::into_event).transpose()
    }

    /// Count stored events for an external identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count_by_external_id(&self, external_event_id: &str) -> Result<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM inbound_event WHERE external_event_id = ?1")
                .bind(external_event_id)
                .fetch_one(self.db.as_ref())
                .await?;
        Ok(row.0)
    }
}
