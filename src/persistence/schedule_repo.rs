//! Scheduled message repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::scheduled::{ScheduleStatus, ScheduledMessage};
use crate::{AppError, Result};

use super::db::Database;
use super::{format_ts, is_unique_violation, parse_ts};

/// Repository wrapper around `SQLite` for scheduled send jobs.
#[derive(Clone)]
pub struct ScheduleRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id: String,
    external_event_id: Option<String>,
    reservation_number: String,
    to_phone: String,
    template_name: String,
    params_json: String,
    run_at: String,
    status: String,
    attempts: i64,
    last_error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ScheduleRow {
    fn into_job(self) -> Result<ScheduledMessage> {
        let attempts = u32::try_from(self.attempts)
            .map_err(|_| AppError::Db(format!("invalid attempts value: {}", self.attempts)))?;

        Ok(ScheduledMessage {
            id: self.id,
            external_event_id: self.external_event_id,
            reservation_number: self.reservation_number,
            to_phone: self.to_phone,
            template_name: self.template_name,
            params_json: self.params_json,
            run_at: parse_ts(&self.run_at)?,
            status: parse_schedule_status(&self.status)?,
            attempts,
            last_error: self.last_error,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

fn parse_schedule_status(s: &str) -> Result<ScheduleStatus> {
    match s {
        "pending" => Ok(ScheduleStatus::Pending),
        "sent" => Ok(ScheduleStatus::Sent),
        "failed" => Ok(ScheduleStatus::Failed),
        "canceled" => Ok(ScheduleStatus::Canceled),
        other => Err(AppError::Db(format!("invalid schedule status: {other}"))),
    }
}

fn schedule_status_str(s: ScheduleStatus) -> &'static str {
    match s {
        ScheduleStatus::Pending => "pending",
        ScheduleStatus::Sent => "sent",
        ScheduleStatus::Failed => "failed",
        ScheduleStatus::Canceled => "canceled",
    }
}

impl ScheduleRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a job unless an identical reminder already exists.
    ///
    /// Returns `true` when the job was inserted, `false` when the unique
    /// (reservation number, template, phone) constraint rejected it —
    /// already scheduled, silently accepted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` for any failure other than the expected
    /// unique-constraint conflict.
    pub async fn insert_if_absent(&self, job: &ScheduledMessage) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO scheduled_message (id, external_event_id, reservation_number,
             to_phone, template_name, params_json, run_at, status, attempts, last_error,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(&job.id)
        .bind(&job.external_event_id)
        .bind(&job.reservation_number)
        .bind(&job.to_phone)
        .bind(&job.template_name)
        .bind(&job.params_json)
        .bind(format_ts(job.run_at))
        .bind(schedule_status_str(job.status))
        .bind(i64::from(job.attempts))
        .bind(&job.last_error)
        .bind(format_ts(job.created_at))
        .bind(format_ts(job.updated_at))
        .execute(self.db.as_ref())
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) if is_unique_violation(&err) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Retrieve a job by identifier.
    ///
    /// Returns `Ok(None)` if the job does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<ScheduledMessage>> {
        let row: Option<ScheduleRow> =
            sqlx::query_as("SELECT * FROM scheduled_message WHERE id = ?1")
                .bind(id)
                .fetch_optional(self.db.as_ref())
                .await?;

        row.map(ScheduleRow::into_job).transpose()
    }

    /// Select due pending jobs, earliest first.
    ///
    /// Only jobs whose `run_at` has passed and whose attempt count is below
    /// `max_attempts` qualify. Canceled, sent, and failed jobs never match.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn due_batch(
        &self,
        now: DateTime<Utc>,
        batch_size: u32,
        max_attempts: u32,
    ) -> Result<Vec<ScheduledMessage>> {
        let rows: Vec<ScheduleRow> = sqlx::query_as(
            "SELECT * FROM scheduled_message
             WHERE status = 'pending' AND run_at <= ?1 AND attempts < ?2
             ORDER BY run_at ASC LIMIT ?3",
        )
        .bind(format_ts(now))
        .bind(i64::from(max_attempts))
        .bind(i64::from(batch_size))
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(ScheduleRow::into_job).collect()
    }

    /// Increment a job's attempt counter and return the new count.
    ///
    /// Committed before the send so that a crash mid-send still counts
    /// as an attempt.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails, `AppError::NotFound` if
    /// the job disappeared.
    pub async fn record_attempt(&self, id: &str) -> Result<u32> {
        let row: Option<(i64,)> = sqlx::query_as(
            "UPDATE scheduled_message
             SET attempts = attempts + 1, updated_at = ?1
             WHERE id = ?2
             RETURNING attempts",
        )
        .bind(format_ts(Utc::now()))
        .bind(id)
        .fetch_optional(self.db.as_ref())
        .await?;

        let (attempts,) =
            row.ok_or_else(|| AppError::NotFound(format!("scheduled message {id} not found")))?;
        u32::try_from(attempts)
            .map_err(|_| AppError::Db(format!("invalid attempts value: {attempts}")))
    }

    /// Mark a job as sent and clear its last error.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn mark_sent(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE scheduled_message
             SET status = 'sent', last_error = NULL, updated_at = ?1
             WHERE id = ?2",
        )
        .bind(format_ts(Utc::now()))
        .bind(id)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// The job stays `pending` for future retries unless the retry budget
    /// is exhausted, in which case it transitions to `failed`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn record_failure(&self, id: &str, last_error: &str, exhausted: bool) -> Result<()> {
        let status = if exhausted { "failed" } else { "pending" };
        sqlx::query(
            "UPDATE scheduled_message
             SET status = ?1, last_error = ?2, updated_at = ?3
             WHERE id = ?4",
        )
        .bind(status)
        .bind(last_error)
        .bind(format_ts(Utc::now()))
        .bind(id)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Cancel every pending job of a template type for a reservation.
    ///
    /// Returns the number of jobs transitioned; zero is a normal outcome.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the bulk update fails.
    pub async fn cancel_pending(
        &self,
        reservation_number: &str,
        template_name: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE scheduled_message
             SET status = 'canceled', updated_at = ?1
             WHERE reservation_number = ?2 AND template_name = ?3 AND status = 'pending'",
        )
        .bind(format_ts(Utc::now()))
        .bind(reservation_number)
        .bind(template_name)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected())
    }
}
