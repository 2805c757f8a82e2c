//! Delivery-status callback correlation.
//!
//! Callbacks arrive loosely keyed: matching prefers the exact
//! conversation/event id, falls back to the most recent send sharing
//! contact and channel within a bounded window, and finally inserts a
//! shell row so status history is never silently discarded.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::models::message_log::{MessageLog, SendStatus};
use crate::persistence::db::Database;
use crate::persistence::message_log_repo::MessageLogRepo;
use crate::Result;

use super::templates::{ci_string, ci_value};

/// Recency bound for the contact+channel fallback match.
const FALLBACK_WINDOW_HOURS: i64 = 24;

/// Fine-grained statuses that classify a shell row as a success.
const SUCCESS_STATUSES: &[&str] = &["sent", "delivered", "read", "success"];

/// How a callback was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationOutcome {
    /// An existing message log was updated in place.
    Updated {
        /// Identifier of the updated record.
        message_log_id: String,
    },
    /// No match was found; a shell row was inserted from the callback.
    Inserted {
        /// Identifier of the inserted record.
        message_log_id: String,
    },
}

/// Fields extracted from one delivery-status callback.
#[derive(Debug, Default, Clone)]
pub struct StatusCallback {
    /// Provider conversation/event correlation id.
    pub conversation_event_id: Option<String>,
    /// Provider contact id.
    pub contact_id: Option<String>,
    /// Provider channel id.
    pub channel_id: Option<String>,
    /// Provider message id.
    pub message_id: Option<String>,
    /// Message direction.
    pub direction: Option<String>,
    /// Fine-grained delivery status.
    pub status: Option<String>,
    /// Status timestamp.
    pub status_at: Option<DateTime<Utc>>,
    /// Provider error code.
    pub error_code: Option<i64>,
    /// Provider error reason.
    pub error_reason: Option<String>,
}

impl StatusCallback {
    /// Extract callback fields from a parsed payload using the same
    /// case-insensitive multi-alias lookup as template field extraction.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Self {
        let Some(map) = payload.as_object() else {
            return Self::default();
        };

        let status_at = ci_string(map, &["timestamp", "creationTime"])
            .as_deref()
            .and_then(parse_callback_instant);
        let error_code = ci_value(map, &["errorCode"]).and_then(Value::as_i64);

        Self {
            conversation_event_id: ci_string(map, &["conversationEventId", "conversationEventID"]),
            contact_id: ci_string(map, &["contactId", "contactID"]),
            channel_id: ci_string(map, &["channelId", "channelID"]),
            message_id: ci_string(map, &["messageId", "messageID"]),
            direction: ci_string(map, &["direction"]),
            status: ci_string(map, &["status"]),
            status_at,
            error_code,
            error_reason: ci_string(map, &["errorReason"]),
        }
    }
}

/// Correlates delivery-status callbacks with stored message logs.
#[derive(Clone)]
pub struct StatusCorrelator {
    logs: MessageLogRepo,
}

impl StatusCorrelator {
    /// Create a correlator over the shared database.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            logs: MessageLogRepo::new(db),
        }
    }

    /// Resolve one callback payload against the message log.
    ///
    /// Matching order, first hit wins: exact conversation/event id, then
    /// the most recent record sharing contact and channel within the last
    /// 24 hours, then a shell insert. A match overwrites a field only when
    /// the callback supplies a non-empty value for it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if a lookup or write fails.
    pub async fn apply(&self, payload: &Value, request_id: &str) -> Result<CorrelationOutcome> {
        let callback = StatusCallback::from_payload(payload);
        debug!(
            request_id,
            conversation_event_id = callback.conversation_event_id.as_deref(),
            contact_id = callback.contact_id.as_deref(),
            status = callback.status.as_deref(),
            "status callback fields extracted"
        );

        let matched = self.find_match(&callback).await?;
        let provider_response = payload.to_string();

        if let Some(mut log) = matched {
            merge_callback(&mut log, &callback);
            log.provider_response = Some(provider_response);
            self.logs.update_correlation(&log).await?;
            info!(
                request_id,
                message_log_id = %log.id,
                status = callback.status.as_deref(),
                "message log updated from callback"
            );
            return Ok(CorrelationOutcome::Updated {
                message_log_id: log.id,
            });
        }

        // No match: keep the history anyway.
        let status = if callback
            .status
            .as_deref()
            .is_some_and(|s| SUCCESS_STATUSES.contains(&s.to_lowercase().as_str()))
        {
            SendStatus::Success
        } else {
            SendStatus::Failed
        };

        let mut log = MessageLog::new(None, None, status);
        log.provider_response = Some(provider_response);
        merge_callback(&mut log, &callback);
        self.logs.create(&log).await?;
        info!(
            request_id,
            message_log_id = %log.id,
            status = callback.status.as_deref(),
            "unmatched callback recorded as shell row"
        );

        Ok(CorrelationOutcome::Inserted {
            message_log_id: log.id,
        })
    }

    async fn find_match(&self, callback: &StatusCallback) -> Result<Option<MessageLog>> {
        if let Some(conversation_event_id) = callback.conversation_event_id.as_deref() {
            if let Some(log) = self
                .logs
                .find_by_conversation_event_id(conversation_event_id)
                .await?
            {
                return Ok(Some(log));
            }
        }

        if let (Some(contact_id), Some(channel_id)) =
            (callback.contact_id.as_deref(), callback.channel_id.as_deref())
        {
            let since = Utc::now() - Duration::hours(FALLBACK_WINDOW_HOURS);
            if let Some(log) = self
                .logs
                .find_recent_by_contact_channel(contact_id, channel_id, since)
                .await?
            {
                return Ok(Some(log));
            }
        }

        Ok(None)
    }
}

/// Overwrite a stored field only when the callback carries a value for it;
/// a callback may be a partial update.
fn merge_callback(log: &mut MessageLog, callback: &StatusCallback) {
    if callback.conversation_event_id.is_some() {
        log.conversation_event_id = callback.conversation_event_id.clone();
    }
    if callback.contact_id.is_some() {
        log.contact_id = callback.contact_id.clone();
    }
    if callback.channel_id.is_some() {
        log.channel_id = callback.channel_id.clone();
    }
    if callback.status.is_some() {
        log.last_status = callback.status.clone();
    }
    if callback.status_at.is_some() {
        log.last_status_at = callback.status_at;
    }
    if callback.direction.is_some() {
        log.direction = callback.direction.clone();
    }
    if callback.message_id.is_some() {
        log.message_id = callback.message_id.clone();
    }
    if callback.error_code.is_some() {
        log.error_code = callback.error_code;
    }
    if callback.error_reason.is_some() {
        log.error_reason = callback.error_reason.clone();
    }
}

fn parse_callback_instant(raw: &str) -> Option<DateTime<Utc>> {
    let normalized = raw.strip_suffix('Z').map_or_else(
        || raw.to_owned(),
        |stripped| format!("{stripped}+00:00"),
    );
    DateTime::parse_from_rfc3339(&normalized)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| super::templates::parse_wall_clock(raw).map(|naive| naive.and_utc()))
}
