//! Reminder scheduling: run-time computation, job creation, cancellation.

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use tracing::{info, warn};

use crate::config::GlobalConfig;
use crate::models::scheduled::ScheduledMessage;
use crate::persistence::db::Database;
use crate::persistence::schedule_repo::ScheduleRepo;
use crate::{AppError, Result};

use super::templates::{self, ExtractedFields, TPL_REMINDER};

/// Result of one scheduling attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// A new job was created.
    Scheduled {
        /// Job identifier.
        id: String,
        /// Absolute UTC run time.
        run_at: DateTime<Utc>,
    },
    /// An identical reminder already exists; accepted as done.
    AlreadyScheduled,
    /// No job was created; the reason is a machine-readable tag.
    Skipped(&'static str),
}

/// Creates and cancels reminder jobs for reservation events.
#[derive(Clone)]
pub struct ReminderScheduler {
    schedules: ScheduleRepo,
    config: Arc<GlobalConfig>,
}

impl ReminderScheduler {
    /// Create a scheduler over the shared database.
    #[must_use]
    pub fn new(db: Arc<Database>, config: Arc<GlobalConfig>) -> Self {
        Self {
            schedules: ScheduleRepo::new(db),
            config,
        }
    }

    /// Schedule the reminder for a confirmed reservation.
    ///
    /// Skips (logged, not an error) when the start instant is missing,
    /// unparseable, or the computed run time is not strictly in the future.
    /// An existing identical reminder is accepted as already scheduled.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails for any reason other than
    /// the uniqueness conflict.
    pub async fn schedule_from_event(
        &self,
        external_event_id: &str,
        reservation_number: &str,
        to_phone: &str,
        fields: &ExtractedFields,
    ) -> Result<ScheduleOutcome> {
        if reservation_number.is_empty() {
            warn!(external_event_id, "reminder skipped: no reservation number");
            return Ok(ScheduleOutcome::Skipped("missing_reservation_number"));
        }

        let Some(start_raw) = fields.start_raw.as_deref() else {
            info!(external_event_id, "reminder skipped: no start instant");
            return Ok(ScheduleOutcome::Skipped("missing_start"));
        };

        let reminder = &self.config.reminder;
        let Some(start_utc) = parse_start_instant(start_raw, reminder.naive_offset_hours) else {
            warn!(external_event_id, start_raw, "reminder skipped: unparseable start instant");
            return Ok(ScheduleOutcome::Skipped("unparseable_start"));
        };

        let run_at = start_utc - Duration::minutes(reminder.lead_minutes);
        if run_at <= Utc::now() {
            info!(
                external_event_id,
                %run_at,
                "reminder skipped: run time not in the future"
            );
            return Ok(ScheduleOutcome::Skipped("not_in_future"));
        }

        let mut reminder_fields = fields.clone();
        reminder_fields.set(
            "reservation_after_minutes",
            reminder.lead_minutes.to_string(),
        );
        reminder_fields.set(
            "allowed_late_minutes",
            reminder.allowed_late_minutes.to_string(),
        );
        let params = templates::build_parameters(
            TPL_REMINDER,
            &reminder_fields,
            &self.config.empty_param_placeholder,
        );
        let params_json = serde_json::to_string(&params)
            .map_err(|err| AppError::Template(format!("failed to serialize params: {err}")))?;

        let job = ScheduledMessage::new(
            Some(external_event_id.to_owned()),
            reservation_number.to_owned(),
            to_phone.to_owned(),
            TPL_REMINDER.to_owned(),
            params_json,
            run_at,
        );

        if self.schedules.insert_if_absent(&job).await? {
            info!(
                external_event_id,
                reservation_number,
                job_id = %job.id,
                %run_at,
                "reminder scheduled"
            );
            Ok(ScheduleOutcome::Scheduled { id: job.id, run_at })
        } else {
            info!(
                external_event_id,
                reservation_number, "reminder already scheduled"
            );
            Ok(ScheduleOutcome::AlreadyScheduled)
        }
    }

    /// Cancel every pending reminder for a reservation.
    ///
    /// Returns the number of jobs transitioned; zero is a normal outcome.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the bulk update fails.
    pub async fn cancel_for_reservation(&self, reservation_number: &str) -> Result<u64> {
        let canceled = self
            .schedules
            .cancel_pending(reservation_number, TPL_REMINDER)
            .await?;
        info!(reservation_number, canceled, "pending reminders canceled");
        Ok(canceled)
    }
}

/// Parse a reservation start instant into absolute UTC.
///
/// An explicit offset is honored as given. A timezone-naive value is
/// interpreted as local to the fixed configured offset — a deliberate,
/// documented policy, since a wrong assumption silently mis-times every
/// reminder.
#[must_use]
pub fn parse_start_instant(raw: &str, naive_offset_hours: i32) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = templates::parse_wall_clock(raw)?;
    let offset = FixedOffset::east_opt(naive_offset_hours.checked_mul(3600)?)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}
