//! Message log repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::message_log::{MessageLog, SendStatus};
use crate::{AppError, Result};

use super::db::Database;
use super::{format_ts, parse_ts};

/// Repository wrapper around `SQLite` for message log records.
#[derive(Clone)]
pub struct MessageLogRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct MessageLogRow {
    id: String,
    phone: Option<String>,
    template_name: Option<String>,
    status: String,
    provider_response: Option<String>,
    conversation_event_id: Option<String>,
    contact_id: Option<String>,
    channel_id: Option<String>,
    last_status: Option<String>,
    last_status_at: Option<String>,
    direction: Option<String>,
    message_id: Option<String>,
    error_code: Option<i64>,
    error_reason: Option<String>,
    created_at: String,
}

impl MessageLogRow {
    fn into_log(self) -> Result<MessageLog> {
        let last_status_at = self
            .last_status_at
            .as_deref()
            .map(parse_ts)
            .transpose()?;

        Ok(MessageLog {
            id: self.id,
            phone: self.phone,
            template_name: self.template_name,
            status: parse_send_status(&self.status)?,
            provider_response: self.provider_response,
            conversation_event_id: self.conversation_event_id,
            contact_id: self.contact_id,
            channel_id: self.channel_id,
            last_status: self.last_status,
            last_status_at,
            direction: self.direction,
            message_id: self.message_id,
            error_code: self.error_code,
            error_reason: self.error_reason,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

fn parse_send_status(s: &str) -> Result<SendStatus> {
    match s {
        "success" => Ok(SendStatus::Success),
        "failed" => Ok(SendStatus::Failed),
        other => Err(AppError::Db(format!("invalid send status: {other}"))),
    }
}

fn send_status_str(s: SendStatus) -> &'static str {
    match s {
        SendStatus::Success => "success",
        SendStatus::Failed => "failed",
    }
}

impl MessageLogRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new message log record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn create(&self, log: &MessageLog) -> Result<()> {
        sqlx::query(
            "INSERT INTO message_log (id, phone, template_name, status, provider_response,
             conversation_event_id, contact_id, channel_id, last_status, last_status_at,
             direction, message_id, error_code, error_reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        )
        .bind(&log.id)
        .bind(&log.phone)
        .bind(&log.template_name)
        .bind(send_status_str(log.status))
        .bind(&log.provider_response)
        .bind(&log.conversation_event_id)
        .bind(&log.contact_id)
        .bind(&log.channel_id)
        .bind(&log.last_status)
        .bind(log.last_status_at.map(format_ts))
        .bind(&log.direction)
        .bind(&log.message_id)
        .bind(log.error_code)
        .bind(&log.error_reason)
        .bind(format_ts(log.created_at))
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Retrieve a message log by identifier.
    ///
    /// Returns `Ok(None)` if the record does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<MessageLog>> {
        let row: Option<MessageLogRow> = sqlx::query_as("SELECT * FROM message_log WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(MessageLogRow::into_log).transpose()
    }

    /// Find the message log matching a provider conversation/event id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_by_conversation_event_id(
        &self,
        conversation_event_id: &str,
    ) -> Result<Option<MessageLog>> {
        let row: Option<MessageLogRow> =
            sqlx::query_as("SELECT * FROM message_log WHERE conversation_event_id = ?1 LIMIT 1")
                .bind(conversation_event_id)
                .fetch_optional(self.db.as_ref())
                .await?;

        row.map(MessageLogRow::into_log).transpose()
    }

    /// Find the most recent message log sharing contact and channel ids,
    /// created at or after `since`.
    ///
    /// This is the loose fallback used when a callback carries no
    /// conversation/event correlation id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_recent_by_contact_channel(
        &self,
        contact_id: &str,
        channel_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<MessageLog>> {
        let row: Option<MessageLogRow> = sqlx::query_as(
            "SELECT * FROM message_log
             WHERE contact_id = ?1 AND channel_id = ?2 AND created_at >= ?3
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(contact_id)
        .bind(channel_id)
        .bind(format_ts(since))
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(MessageLogRow::into_log).transpose()
    }

    /// Overwrite the mutable correlation fields of an existing record.
    ///
    /// The caller is responsible for merging callback values into the
    /// fetched record first; this writes the merged state back.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn update_correlation(&self, log: &MessageLog) -> Result<()> {
        sqlx::query(
            "UPDATE message_log SET
             provider_response = ?1, conversation_event_id = ?2, contact_id = ?3,
             channel_id = ?4, last_status = ?5, last_status_at = ?6, direction = ?7,
             message_id = ?8, error_code = ?9, error_reason = ?10
             WHERE id = ?11",
        )
        .bind(&log.provider_response)
        .bind(&log.conversation_event_id)
        .bind(&log.contact_id)
        .bind(&log.channel_id)
        .bind(&log.last_status)
        .bind(log.last_status_at.map(format_ts))
        .bind(&log.direction)
        .bind(&log.message_id)
        .bind(log.error_code)
        .bind(&log.error_reason)
        .bind(&log.id)
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// List all message logs for a phone number, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_by_phone(&self, phone: &str) -> Result<Vec<MessageLog>> {
        let rows: Vec<MessageLogRow> = sqlx::query_as(
            "SELECT * FROM message_log WHERE phone = ?1 ORDER BY created_at DESC",
        )
        .bind(phone)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(MessageLogRow::into_log).collect()
    }

    /// Count all message log records.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM message_log")
            .fetch_one(self.db.as_ref())
            .await?;
        Ok(row.0)
    }
}
