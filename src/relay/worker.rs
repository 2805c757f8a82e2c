//! Background reminder delivery worker.
//!
//! Polls the schedule table on a fixed interval and drains due jobs.
//! The attempt counter is incremented and committed before the send, so
//! a crash mid-send still consumes retry budget and a poison job can
//! never loop forever.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::GlobalConfig;
use crate::models::message_log::{MessageLog, SendStatus};
use crate::models::scheduled::ScheduledMessage;
use crate::persistence::db::Database;
use crate::persistence::message_log_repo::MessageLogRepo;
use crate::persistence::schedule_repo::ScheduleRepo;
use crate::provider::{envelope, MessageSender};
use crate::{AppError, Result};

use super::ingest::apply_outcome;
use super::templates;

/// Stored error strings are capped so one oversized provider body cannot
/// bloat the schedule table.
const ERROR_TEXT_LIMIT: usize = 500;

/// Drains due reminder jobs and dispatches them through the provider.
pub struct ReminderWorker {
    config: Arc<GlobalConfig>,
    schedules: ScheduleRepo,
    logs: MessageLogRepo,
    sender: Arc<dyn MessageSender>,
}

impl ReminderWorker {
    /// Create a worker over the shared database and sender.
    #[must_use]
    pub fn new(
        db: Arc<Database>,
        config: Arc<GlobalConfig>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            schedules: ScheduleRepo::new(Arc::clone(&db)),
            logs: MessageLogRepo::new(db),
            config,
            sender,
        }
    }

    /// Spawn the polling loop; it runs until the token is cancelled.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let poll = Duration::from_secs(self.config.reminder.poll_seconds);
        tokio::spawn(async move {
            let mut ticker = interval(poll);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(poll_seconds = poll.as_secs(), "reminder worker started");

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        info!("reminder worker stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(err) = self.tick().await {
                            error!(%err, "reminder tick failed");
                        }
                    }
                }
            }
        })
    }

    /// Run one polling pass: select due jobs and process each in turn.
    ///
    /// One job's failure is recorded against that job only and never
    /// aborts the rest of the batch.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` only when the due-batch query itself fails;
    /// per-job errors are absorbed into the job's failure record.
    pub async fn tick(&self) -> Result<usize> {
        let reminder = &self.config.reminder;
        let due = self
            .schedules
            .due_batch(Utc::now(), reminder.batch_size, reminder.max_attempts)
            .await?;

        if due.is_empty() {
            debug!("no due reminders");
            return Ok(0);
        }

        info!(count = due.len(), "processing due reminders");
        let mut processed = 0;
        for job in due {
            let job_id = job.id.clone();
            match self.process_job(job).await {
                Ok(()) => processed += 1,
                Err(err) => {
                    error!(job_id = %job_id, %err, "reminder job bookkeeping failed");
                }
            }
        }
        Ok(processed)
    }

    /// Process a single due job: count the attempt, send, settle state.
    async fn process_job(&self, job: ScheduledMessage) -> Result<()> {
        let attempts = self.schedules.record_attempt(&job.id).await?;
        let exhausted = attempts >= self.config.reminder.max_attempts;

        match self.dispatch(&job).await {
            Ok(log) => {
                self.logs.create(&log).await?;
                if log.status == SendStatus::Success {
                    self.schedules.mark_sent(&job.id).await?;
                    info!(
                        job_id = %job.id,
                        to_phone = %job.to_phone,
                        attempts,
                        "reminder sent"
                    );
                } else {
                    let reason = log
                        .error_reason
                        .as_deref()
                        .unwrap_or("provider rejected send");
                    self.settle_failure(&job, attempts, exhausted, reason).await?;
                }
            }
            Err(err) => {
                let mut log = MessageLog::new(
                    Some(job.to_phone.clone()),
                    Some(job.template_name.clone()),
                    SendStatus::Failed,
                );
                log.provider_response = Some(envelope(false, &err.to_string()));
                log.channel_id = Some(self.config.whatsapp.channel_id.clone());
                self.logs.create(&log).await?;
                self.settle_failure(&job, attempts, exhausted, &err.to_string())
                    .await?;
            }
        }
        Ok(())
    }

    /// Build and execute the provider call for one job.
    ///
    /// A parameter-count mismatch against the stored payload refuses the
    /// send before touching the provider.
    async fn dispatch(&self, job: &ScheduledMessage) -> Result<MessageLog> {
        let params: Vec<String> = serde_json::from_str(&job.params_json)
            .map_err(|err| AppError::Template(format!("stored params unreadable: {err}")))?;

        if let Some(expected) = templates::expected_param_count(&job.template_name) {
            if params.len() != expected {
                return Err(AppError::Template(format!(
                    "param_count_mismatch: expected {expected}, stored {}",
                    params.len()
                )));
            }
        }

        let outcome = self
            .sender
            .send_template(
                &job.template_name,
                &job.to_phone,
                &params,
                &self.config.whatsapp.language,
            )
            .await?;

        let status = if outcome.success {
            SendStatus::Success
        } else {
            SendStatus::Failed
        };
        let mut log = MessageLog::new(
            Some(job.to_phone.clone()),
            Some(job.template_name.clone()),
            status,
        );
        log.provider_response = Some(outcome.response_envelope());
        log.channel_id = Some(self.config.whatsapp.channel_id.clone());
        apply_outcome(&mut log, &outcome);
        Ok(log)
    }

    async fn settle_failure(
        &self,
        job: &ScheduledMessage,
        attempts: u32,
        exhausted: bool,
        reason: &str,
    ) -> Result<()> {
        let reason = truncate_error(reason);
        self.schedules
            .record_failure(&job.id, &reason, exhausted)
            .await?;
        if exhausted {
            warn!(
                job_id = %job.id,
                attempts,
                reason = %reason,
                "reminder failed permanently, retry budget exhausted"
            );
        } else {
            warn!(
                job_id = %job.id,
                attempts,
                reason = %reason,
                "reminder attempt failed, will retry"
            );
        }
        Ok(())
    }
}

fn truncate_error(reason: &str) -> String {
    if reason.chars().count() <= ERROR_TEXT_LIMIT {
        reason.to_owned()
    } else {
        reason.chars().take(ERROR_TEXT_LIMIT).collect()
    }
}
