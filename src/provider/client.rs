//! Outbound WhatsApp provider client.
//!
//! Bearer-authenticated template and free-text sends over the provider's
//! service-account API, with the shared [`TokenCache`] in front of the
//! client-credentials token endpoint.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::config::WhatsAppConfig;
use crate::{AppError, Result};

use super::token_cache::TokenCache;
use super::{MessageSender, SendOutcome};

const TOKEN_TIMEOUT: Duration = Duration::from_secs(10);
const SEND_TIMEOUT: Duration = Duration::from_secs(15);
const BODY_LOG_LIMIT: usize = 1000;

/// Provider HTTP client shared across all outbound sends.
pub struct ProviderClient {
    http: reqwest::Client,
    config: WhatsAppConfig,
    tokens: TokenCache,
}

impl ProviderClient {
    /// Build a client from provider settings.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Provider` if the HTTP client cannot be built.
    pub fn new(config: WhatsAppConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| AppError::Provider(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            config,
            tokens: TokenCache::new(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Obtain a bearer token, refreshing through the cache when needed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Provider` if the token endpoint fails.
    pub async fn access_token(&self) -> Result<String> {
        self.tokens.get(|| self.fetch_token()).await
    }

    async fn fetch_token(&self) -> Result<(String, u64)> {
        let url = self.endpoint("connect/token");
        info!(%url, client_id = %self.config.client_id, "provider token request");

        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "client_credentials"),
            ("scope", self.config.scope.as_str()),
        ];
        let response = self
            .http
            .post(&url)
            .timeout(TOKEN_TIMEOUT)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Provider(format!(
                "token endpoint returned {status}"
            )));
        }

        let payload: Value = response.json().await?;
        let token = payload
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Provider("token response missing access_token".into()))?
            .to_owned();
        let ttl_seconds = payload
            .get("expires_in")
            .and_then(Value::as_u64)
            .unwrap_or(3600);

        Ok((token, ttl_seconds))
    }

    async fn post_send(&self, path: &str, body: Value) -> Result<SendOutcome> {
        let token = self.access_token().await?;
        let url = self.endpoint(path);

        let response = self
            .http
            .post(&url)
            .timeout(SEND_TIMEOUT)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let raw_body = response.text().await?;
        let fields = flatten_response(&raw_body);

        Ok(SendOutcome {
            success: status.is_success(),
            raw_body,
            fields,
        })
    }
}

#[async_trait]
impl MessageSender for ProviderClient {
    async fn send_template(
        &self,
        template_name: &str,
        to_phone: &str,
        parameters: &[String],
        language: &str,
    ) -> Result<SendOutcome> {
        let mut body = json!({
            "ChannelId": self.config.channel_id,
            "TemplateName": template_name,
            "Language": language,
            "ToNumber": to_phone,
        });

        // The parameter block is omitted entirely for zero-slot templates.
        if !parameters.is_empty() {
            let values: Vec<Value> = parameters
                .iter()
                .map(|v| json!({ "Type": "text", "Text": v }))
                .collect();
            body["Parameters"] = json!([{ "Type": "Body", "Values": values }]);
        }

        info!(
            to = %to_phone,
            template = %template_name,
            language = %language,
            param_count = parameters.len(),
            "provider template send"
        );

        let outcome = self
            .post_send("v1/whatsapp/service-account/sendTemplate", body)
            .await?;

        if outcome.success {
            info!(
                to = %to_phone,
                template = %template_name,
                conversation_event_id = outcome.conversation_event_id(),
                "provider template send succeeded"
            );
        } else {
            error!(
                to = %to_phone,
                template = %template_name,
                body = %truncate(&outcome.raw_body, BODY_LOG_LIMIT),
                "provider template send failed"
            );
        }

        Ok(outcome)
    }

    async fn send_text(&self, to_phone: &str, text: &str) -> Result<SendOutcome> {
        let body = json!({
            "ChannelId": self.config.channel_id,
            "Text": text,
            "ToNumber": to_phone,
        });

        info!(to = %to_phone, text_length = text.len(), "provider text send");

        let outcome = self
            .post_send("v1/whatsapp/service-account/sendText", body)
            .await?;

        if outcome.success {
            info!(
                to = %to_phone,
                conversation_event_id = outcome.conversation_event_id(),
                "provider text send succeeded"
            );
        } else {
            error!(
                to = %to_phone,
                body = %truncate(&outcome.raw_body, BODY_LOG_LIMIT),
                "provider text send failed"
            );
        }

        Ok(outcome)
    }
}

/// Best-effort parse of a provider response body into a lower-cased flat
/// field map. Anything that is not a JSON object yields an empty map —
/// callers must tolerate a missing correlation id.
#[must_use]
pub fn flatten_response(raw_body: &str) -> HashMap<String, String> {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw_body) else {
        return HashMap::new();
    };

    map.into_iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.to_lowercase(), text))
        })
        .collect()
}

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
