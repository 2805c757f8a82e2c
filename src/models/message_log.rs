//! Message log model recording every outbound send attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse outcome of one send attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    /// Provider accepted the send (2xx).
    Success,
    /// Send refused, rejected, or never attempted.
    Failed,
}

/// Outcome of one outbound send attempt, mutated later only by
/// delivery-status correlation. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MessageLog {
    /// Unique record identifier.
    pub id: String,
    /// Recipient phone in normalized form.
    pub phone: Option<String>,
    /// Template identifier; `None` for free-text sends.
    pub template_name: Option<String>,
    /// Coarse send outcome.
    pub status: SendStatus,
    /// Raw provider response envelope.
    pub provider_response: Option<String>,
    /// Provider conversation/event correlation id, when returned.
    pub conversation_event_id: Option<String>,
    /// Provider contact id.
    pub contact_id: Option<String>,
    /// Provider channel id.
    pub channel_id: Option<String>,
    /// Last fine-grained delivery status reported by the provider.
    pub last_status: Option<String>,
    /// Timestamp of the last fine-grained status.
    pub last_status_at: Option<DateTime<Utc>>,
    /// Message direction reported by the provider.
    pub direction: Option<String>,
    /// Provider message id.
    pub message_id: Option<String>,
    /// Provider error code, if the send or delivery failed.
    pub error_code: Option<i64>,
    /// Provider error reason, if the send or delivery failed.
    pub error_reason: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl MessageLog {
    /// Construct a log entry for a send attempt; correlation fields start
    /// empty and are filled from the provider response or a later callback.
    #[must_use]
    pub fn new(phone: Option<String>, template_name: Option<String>, status: SendStatus) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            phone,
            template_name,
            status,
            provider_response: None,
            conversation_event_id: None,
            contact_id: None,
            channel_id: None,
            last_status: None,
            last_status_at: None,
            direction: None,
            message_id: None,
            error_code: None,
            error_reason: None,
            created_at: Utc::now(),
        }
    }
}
