//! Inbound reservation event processing pipeline.
//!
//! One call per webhook delivery: validate, dedup by external event id,
//! resolve the template, dispatch, persist the message log, then run the
//! post-send effects (admin fan-out, reminder scheduling, reminder
//! cancellation). The dedup insert is committed before any send, so a
//! failure in a later stage never re-opens the event for reprocessing.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::{GlobalConfig, SendMode};
use crate::models::message_log::{MessageLog, SendStatus};
use crate::models::event::InboundEvent;
use crate::persistence::db::Database;
use crate::persistence::event_repo::EventRepo;
use crate::persistence::lock_repo::LockRepo;
use crate::persistence::message_log_repo::MessageLogRepo;
use crate::provider::{envelope, MessageSender, SendOutcome};
use crate::Result;

use super::phone;
use super::scheduler::ReminderScheduler;
use super::templates::{
    self, ExtractedFields, TPL_ADMIN_CONFIRMED, TPL_CANCELLED, TPL_CONFIRMED,
};

/// Terminal result of processing one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Payload lacked the external event id or event name; dropped.
    MissingFields,
    /// External event id already processed; idempotent no-op.
    Duplicate,
    /// An idempotency lock for this notification already exists; skipped.
    AlreadySent,
    /// Pipeline ran to completion with the given send outcome.
    Processed {
        /// Coarse outcome persisted in the message log.
        status: SendStatus,
    },
}

/// Processes inbound reservation events end to end.
pub struct EventIngestor {
    config: Arc<GlobalConfig>,
    events: EventRepo,
    logs: MessageLogRepo,
    locks: LockRepo,
    scheduler: ReminderScheduler,
    sender: Arc<dyn MessageSender>,
}

impl EventIngestor {
    /// Create an ingestor over the shared database and sender.
    #[must_use]
    pub fn new(
        db: Arc<Database>,
        config: Arc<GlobalConfig>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            events: EventRepo::new(Arc::clone(&db)),
            logs: MessageLogRepo::new(Arc::clone(&db)),
            locks: LockRepo::new(Arc::clone(&db)),
            scheduler: ReminderScheduler::new(db, Arc::clone(&config)),
            config,
            sender,
        }
    }

    /// Run the full pipeline for one parsed webhook payload.
    ///
    /// Business-rule gaps (missing phone, unsupported event, parameter-count
    /// mismatch) become failed message-log rows with machine-readable
    /// reasons, never errors.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` when persistence itself fails; the caller
    /// logs and acknowledges regardless.
    pub async fn process(&self, payload: &Value, request_id: &str) -> Result<IngestOutcome> {
        let top = payload.as_object();
        let external_event_id = top.and_then(|m| templates::ci_string(m, &["id"]));
        let event_name = top.and_then(|m| templates::ci_string(m, &["eventName"]));

        let (Some(external_event_id), Some(event_name)) = (external_event_id, event_name) else {
            warn!(request_id, "event dropped: missing external id or event name");
            return Ok(IngestOutcome::MissingFields);
        };

        let fields = templates::extract_fields(payload);
        let phone = phone::normalize(fields.phone_raw.as_deref(), &self.config.phone);

        info!(
            request_id,
            external_event_id,
            event_name,
            phone = phone.as_deref(),
            "event payload extracted"
        );

        // Authoritative dedup gate: the unique-constraint conflict on this
        // insert is the duplicate signal, not any pre-check.
        let event = InboundEvent::new(
            external_event_id.clone(),
            event_name.clone(),
            phone.clone(),
            payload.to_string(),
        );
        if !self.events.insert_if_absent(&event).await? {
            info!(request_id, external_event_id, "duplicate event skipped");
            return Ok(IngestOutcome::Duplicate);
        }

        let template = templates::map_event_to_template(&event_name);
        let reservation_number = fields.get("reservation_number").to_owned();

        let attempt = match (&phone, self.config.send_mode, template) {
            (None, _, _) => {
                warn!(request_id, external_event_id, "no recipient phone");
                SendAttempt::refused(template, "missing_phone")
            }
            (Some(to_phone), SendMode::Text, _) => {
                let text = templates::build_text_message(&event_name, &fields);
                self.attempt_text(to_phone, &text).await
            }
            (Some(_), SendMode::Template, None) => {
                warn!(request_id, event_name, "unsupported event");
                SendAttempt::refused(None, &format!("unsupported_event:{event_name}"))
            }
            (Some(to_phone), SendMode::Template, Some(template)) => {
                if !reservation_number.is_empty()
                    && !self
                        .locks
                        .acquire(&reservation_number, template, to_phone)
                        .await?
                {
                    info!(
                        request_id,
                        reservation_number,
                        template,
                        "notification already sent, skipped"
                    );
                    return Ok(IngestOutcome::AlreadySent);
                }
                self.attempt_template(template, to_phone, &fields).await
            }
        };

        let mut log = MessageLog::new(phone.clone(), attempt.template.clone(), attempt.status);
        log.provider_response = Some(attempt.response_envelope.clone());
        log.channel_id = Some(self.config.whatsapp.channel_id.clone());
        if let Some(outcome) = &attempt.outcome {
            apply_outcome(&mut log, outcome);
        }
        self.logs.create(&log).await?;

        info!(
            request_id,
            external_event_id,
            message_log_id = %log.id,
            status = ?attempt.status,
            "message log saved"
        );

        if attempt.status == SendStatus::Success {
            self.post_send_effects(
                request_id,
                &external_event_id,
                template,
                &reservation_number,
                &fields,
            )
            .await;
        }

        Ok(IngestOutcome::Processed {
            status: attempt.status,
        })
    }

    async fn attempt_text(&self, to_phone: &str, text: &str) -> SendAttempt {
        match self.sender.send_text(to_phone, text).await {
            Ok(outcome) => SendAttempt::from_outcome(None, outcome),
            Err(err) => {
                error!(%err, to_phone, "text send transport failure");
                SendAttempt::refused(None, &err.to_string())
            }
        }
    }

    async fn attempt_template(
        &self,
        template: &str,
        to_phone: &str,
        fields: &ExtractedFields,
    ) -> SendAttempt {
        let params =
            templates::build_parameters(template, fields, &self.config.empty_param_placeholder);

        if let Some(expected) = templates::expected_param_count(template) {
            if params.len() != expected {
                warn!(
                    template,
                    expected,
                    resolved = params.len(),
                    "parameter count mismatch, send refused"
                );
                return SendAttempt::refused(Some(template), "param_count_mismatch");
            }
        }

        match self
            .sender
            .send_template(template, to_phone, &params, &self.config.whatsapp.language)
            .await
        {
            Ok(outcome) => SendAttempt::from_outcome(Some(template), outcome),
            Err(err) => {
                error!(%err, to_phone, template, "template send transport failure");
                SendAttempt::refused(Some(template), &err.to_string())
            }
        }
    }

    /// Post-send side effects for a successful send, branched on template
    /// identity. Failures here are logged, never propagated — the dedup
    /// record and message log are already durable.
    async fn post_send_effects(
        &self,
        request_id: &str,
        external_event_id: &str,
        template: Option<&str>,
        reservation_number: &str,
        fields: &ExtractedFields,
    ) {
        match template {
            Some(TPL_CONFIRMED) => {
                self.admin_fanout(request_id, reservation_number, fields)
                    .await;

                if let Some(phone) =
                    phone::normalize(fields.phone_raw.as_deref(), &self.config.phone)
                {
                    match self
                        .scheduler
                        .schedule_from_event(external_event_id, reservation_number, &phone, fields)
                        .await
                    {
                        Ok(outcome) => {
                            info!(request_id, ?outcome, "reminder scheduling evaluated");
                        }
                        Err(err) => {
                            error!(request_id, %err, "reminder scheduling failed");
                        }
                    }
                }
            }
            Some(TPL_CANCELLED) if !reservation_number.is_empty() => {
                if let Err(err) = self
                    .scheduler
                    .cancel_for_reservation(reservation_number)
                    .await
                {
                    error!(request_id, %err, "reminder cancellation failed");
                }
            }
            _ => {}
        }
    }

    /// Best-effort admin fan-out: one send per configured admin number,
    /// each guarded by its own idempotency lock and recorded in its own
    /// message log. One recipient's failure never blocks the others.
    async fn admin_fanout(
        &self,
        request_id: &str,
        reservation_number: &str,
        fields: &ExtractedFields,
    ) {
        for raw_number in &self.config.admin_numbers {
            let Some(admin_phone) = phone::normalize(Some(raw_number), &self.config.phone) else {
                warn!(request_id, raw_number, "admin number unusable, skipped");
                continue;
            };

            if let Err(err) = self
                .send_admin_copy(request_id, reservation_number, &admin_phone, fields)
                .await
            {
                error!(request_id, admin_phone, %err, "admin fan-out recipient failed");
            }
        }
    }

    async fn send_admin_copy(
        &self,
        request_id: &str,
        reservation_number: &str,
        admin_phone: &str,
        fields: &ExtractedFields,
    ) -> Result<()> {
        if !reservation_number.is_empty()
            && !self
                .locks
                .acquire(reservation_number, TPL_ADMIN_CONFIRMED, admin_phone)
                .await?
        {
            info!(
                request_id,
                reservation_number, admin_phone, "admin copy already sent, skipped"
            );
            return Ok(());
        }

        let attempt = self
            .attempt_template(TPL_ADMIN_CONFIRMED, admin_phone, fields)
            .await;

        let mut log = MessageLog::new(
            Some(admin_phone.to_owned()),
            attempt.template.clone(),
            attempt.status,
        );
        log.provider_response = Some(attempt.response_envelope.clone());
        log.channel_id = Some(self.config.whatsapp.channel_id.clone());
        if let Some(outcome) = &attempt.outcome {
            apply_outcome(&mut log, outcome);
        }
        self.logs.create(&log).await?;

        info!(
            request_id,
            admin_phone,
            status = ?attempt.status,
            "admin copy processed"
        );
        Ok(())
    }
}

/// Internal result of one dispatch attempt, before persistence.
struct SendAttempt {
    status: SendStatus,
    template: Option<String>,
    response_envelope: String,
    outcome: Option<SendOutcome>,
}

impl SendAttempt {
    /// A send that was refused or failed at the transport level; `reason`
    /// lands in the persisted provider-response envelope.
    fn refused(template: Option<&str>, reason: &str) -> Self {
        Self {
            status: SendStatus::Failed,
            template: template.map(ToOwned::to_owned),
            response_envelope: envelope(false, reason),
            outcome: None,
        }
    }

    fn from_outcome(template: Option<&str>, outcome: SendOutcome) -> Self {
        let status = if outcome.success {
            SendStatus::Success
        } else {
            SendStatus::Failed
        };
        Self {
            status,
            template: template.map(ToOwned::to_owned),
            response_envelope: outcome.response_envelope(),
            outcome: Some(outcome),
        }
    }
}

/// Copy provider-reported correlation fields onto a message log row.
pub(crate) fn apply_outcome(log: &mut MessageLog, outcome: &SendOutcome) {
    log.conversation_event_id = outcome.conversation_event_id().map(ToOwned::to_owned);
    log.contact_id = outcome.contact_id().map(ToOwned::to_owned);
    log.last_status = outcome.fields.get("status").cloned();
    log.error_reason = outcome.fields.get("message").cloned();
}
