//! Scheduled reminder job model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status for a scheduled send job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    /// Waiting for its run time.
    Pending,
    /// Delivered by the worker.
    Sent,
    /// Retry budget exhausted.
    Failed,
    /// Cancelled before it ran.
    Canceled,
}

/// A future send job created when a qualifying reservation event succeeds.
///
/// Storage enforces uniqueness on (reservation number, template, phone) so
/// re-scheduling the same reminder is rejected, not duplicated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ScheduledMessage {
    /// Unique record identifier.
    pub id: String,
    /// External event id of the event that scheduled this job.
    pub external_event_id: Option<String>,
    /// Reservation number; cancellation key.
    pub reservation_number: String,
    /// Destination phone in normalized form.
    pub to_phone: String,
    /// Template to send.
    pub template_name: String,
    /// Ordered parameter values, serialized as a JSON array.
    pub params_json: String,
    /// Absolute run time in UTC.
    pub run_at: DateTime<Utc>,
    /// Current job status.
    pub status: ScheduleStatus,
    /// Send attempts made so far.
    pub attempts: u32,
    /// Diagnostic from the most recent failed attempt.
    pub last_error: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl ScheduledMessage {
    /// Construct a pending job with a generated identifier.
    #[must_use]
    pub fn new(
        external_event_id: Option<String>,
        reservation_number: String,
        to_phone: String,
        template_name: String,
        params_json: String,
        run_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            external_event_id,
            reservation_number,
            to_phone,
            template_name,
            params_json,
            run_at,
            status: ScheduleStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
