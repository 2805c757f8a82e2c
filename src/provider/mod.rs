//! WhatsApp provider integration: token cache and outbound client.

pub mod client;
pub mod token_cache;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::Result;

/// Normalized result of one provider send call.
///
/// Business-level failures (non-2xx) are carried here as `success = false`;
/// only transport-level faults surface as `AppError::Provider`.
#[derive(Debug, Clone, Default)]
pub struct SendOutcome {
    /// Whether the provider returned a 2xx status.
    pub success: bool,
    /// Raw response body.
    pub raw_body: String,
    /// Best-effort, lower-cased flat field map parsed from the body.
    /// Empty when the body is not a JSON object.
    pub fields: HashMap<String, String>,
}

impl SendOutcome {
    /// Provider conversation/event correlation id, when present.
    #[must_use]
    pub fn conversation_event_id(&self) -> Option<&str> {
        self.fields.get("conversationeventid").map(String::as_str)
    }

    /// Provider contact id, when present.
    #[must_use]
    pub fn contact_id(&self) -> Option<&str> {
        self.fields.get("contactid").map(String::as_str)
    }

    /// Persisted provider-response envelope for the message log.
    #[must_use]
    pub fn response_envelope(&self) -> String {
        envelope(self.success, &self.raw_body)
    }
}

/// Serialize a send outcome into the stored provider-response envelope.
#[must_use]
pub fn envelope(success: bool, response: &str) -> String {
    serde_json::json!({ "success": success, "response": response }).to_string()
}

/// Outbound message dispatch seam.
///
/// Implemented by the real provider client and by test doubles so that
/// ingestion and the reminder worker are exercised without a network.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send a template message with positional body parameters.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Provider` only for transport-level faults;
    /// a non-2xx provider response is a `SendOutcome` with `success = false`.
    async fn send_template(
        &self,
        template_name: &str,
        to_phone: &str,
        parameters: &[String],
        language: &str,
    ) -> Result<SendOutcome>;

    /// Send a free-text message.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Provider` only for transport-level faults.
    async fn send_text(&self, to_phone: &str, text: &str) -> Result<SendOutcome>;
}
