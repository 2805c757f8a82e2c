//! Inbound reservation event model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One reservation lifecycle event received from the booking platform.
///
/// `external_event_id` carries a uniqueness constraint in storage; a second
/// arrival with the same identifier is the duplicate signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct InboundEvent {
    /// Unique record identifier.
    pub id: String,
    /// Upstream-assigned event identifier; the dedup key.
    pub external_event_id: String,
    /// Event name, e.g. `ReservationConfirmedEvent`.
    pub event_name: String,
    /// Normalized recipient phone, when one was present.
    pub phone: Option<String>,
    /// Raw JSON payload as received.
    pub payload_json: String,
    /// Receipt timestamp.
    pub created_at: DateTime<Utc>,
}

impl InboundEvent {
    /// Construct a new event record with a generated identifier.
    #[must_use]
    pub fn new(
        external_event_id: String,
        event_name: String,
        phone: Option<String>,
        payload_json: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            external_event_id,
            event_name,
            phone,
            payload_json,
            created_at: Utc::now(),
        }
    }
}
