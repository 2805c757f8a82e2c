//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::{AppError, Result};

/// Outbound send mode for reservation notifications.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SendMode {
    /// Provider-registered template messages with positional parameters.
    Template,
    /// Plain free-text messages built from the event payload.
    Text,
}

/// Booking-platform webhook settings.
///
/// The shared basic-auth value is loaded at runtime from the environment,
/// never from the TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BookingConfig {
    /// Expected value of the `__tenant` header; empty disables the check.
    #[serde(default)]
    pub tenant_id: String,
    /// Expected basic-auth credential (populated at runtime).
    #[serde(skip)]
    pub basic_auth: String,
}

/// WhatsApp provider connectivity settings.
///
/// Client credentials and the callback HMAC secret are loaded at runtime
/// from the environment, never from the TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WhatsAppConfig {
    /// Provider API base URL.
    pub base_url: String,
    /// Channel identifier used for every outbound send.
    pub channel_id: String,
    /// OAuth scope requested from the token endpoint.
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Template language code.
    #[serde(default = "default_language")]
    pub language: String,
    /// OAuth client id (populated at runtime).
    #[serde(skip)]
    pub client_id: String,
    /// OAuth client secret (populated at runtime).
    #[serde(skip)]
    pub client_secret: String,
    /// Shared secret for status-callback signatures; empty skips verification.
    #[serde(skip)]
    pub webhook_secret: String,
}

/// Phone normalization policy.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PhoneConfig {
    /// Country code prepended when expanding local forms.
    #[serde(default = "default_country_code")]
    pub country_code: String,
    /// Leading digit of a bare 9-digit mobile number.
    #[serde(default = "default_mobile_prefix")]
    pub mobile_prefix: String,
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            country_code: default_country_code(),
            mobile_prefix: default_mobile_prefix(),
        }
    }
}

/// Reminder scheduling and worker settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ReminderConfig {
    /// Minutes before the reservation start at which the reminder fires.
    #[serde(default = "default_lead_minutes")]
    pub lead_minutes: i64,
    /// Allowed lateness communicated in the reminder message.
    #[serde(default = "default_allowed_late_minutes")]
    pub allowed_late_minutes: i64,
    /// Fixed UTC offset (hours) assumed for timezone-naive start instants.
    #[serde(default = "default_naive_offset_hours")]
    pub naive_offset_hours: i32,
    /// Seconds between worker polling ticks.
    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: u64,
    /// Maximum due jobs processed per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Maximum send attempts before a job is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            lead_minutes: default_lead_minutes(),
            allowed_late_minutes: default_allowed_late_minutes(),
            naive_offset_hours: default_naive_offset_hours(),
            poll_seconds: default_poll_seconds(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_scope() -> String {
    "WhatsAppAPI".into()
}

fn default_language() -> String {
    "ar".into()
}

fn default_country_code() -> String {
    "966".into()
}

fn default_mobile_prefix() -> String {
    "5".into()
}

fn default_lead_minutes() -> i64 {
    20
}

fn default_allowed_late_minutes() -> i64 {
    15
}

fn default_naive_offset_hours() -> i32 {
    3
}

fn default_poll_seconds() -> u64 {
    5
}

fn default_batch_size() -> u32 {
    50
}

fn default_max_attempts() -> u32 {
    5
}

fn default_http_port() -> u16 {
    8080
}

fn default_db_path() -> PathBuf {
    PathBuf::from("booking-relay.db")
}

fn default_placeholder() -> String {
    "-".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// HTTP port for webhook endpoints.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// `SQLite` database file path.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Outbound send mode.
    pub send_mode: SendMode,
    /// Substituted for empty template parameter values
    /// (the provider rejects empty body parameters).
    #[serde(default = "default_placeholder")]
    pub empty_param_placeholder: String,
    /// Admin phone numbers that receive the confirmation fan-out.
    #[serde(default)]
    pub admin_numbers: Vec<String>,
    /// Booking-platform webhook settings.
    pub booking: BookingConfig,
    /// WhatsApp provider settings.
    pub whatsapp: WhatsAppConfig,
    /// Phone normalization policy.
    #[serde(default)]
    pub phone: PhoneConfig,
    /// Reminder scheduling and worker settings.
    #[serde(default)]
    pub reminder: ReminderConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load provider and booking credentials from environment variables.
    ///
    /// `WHATSAPP_CLIENT_ID` and `WHATSAPP_CLIENT_SECRET` are required.
    /// `WHATSAPP_WEBHOOK_SECRET` and `BOOKING_BASIC_AUTH` are optional;
    /// leaving them unset disables the corresponding check.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing.
    pub fn load_credentials(&mut self) -> Result<()> {
        self.whatsapp.client_id = require_env("WHATSAPP_CLIENT_ID")?;
        self.whatsapp.client_secret = require_env("WHATSAPP_CLIENT_SECRET")?;
        self.whatsapp.webhook_secret = env::var("WHATSAPP_WEBHOOK_SECRET").unwrap_or_default();
        self.booking.basic_auth = env::var("BOOKING_BASIC_AUTH").unwrap_or_default();
        Ok(())
    }

    /// Log a safe summary of the loaded settings with secrets masked.
    pub fn log_summary(&self) {
        info!(
            http_port = self.http_port,
            db_path = %self.db_path.display(),
            send_mode = ?self.send_mode,
            base_url = %self.whatsapp.base_url,
            channel_id = %self.whatsapp.channel_id,
            client_id = %mask(&self.whatsapp.client_id),
            webhook_secret = if self.whatsapp.webhook_secret.is_empty() { "empty" } else { "set" },
            tenant_id = %self.booking.tenant_id,
            admin_numbers = self.admin_numbers.len(),
            lead_minutes = self.reminder.lead_minutes,
            naive_offset_hours = self.reminder.naive_offset_hours,
            "settings loaded"
        );
    }

    fn validate(&self) -> Result<()> {
        if self.whatsapp.base_url.is_empty() {
            return Err(AppError::Config("whatsapp.base_url must not be empty".into()));
        }
        if self.whatsapp.channel_id.is_empty() {
            return Err(AppError::Config(
                "whatsapp.channel_id must not be empty".into(),
            ));
        }
        if self.reminder.max_attempts == 0 {
            return Err(AppError::Config(
                "reminder.max_attempts must be greater than zero".into(),
            ));
        }
        if self.reminder.batch_size == 0 {
            return Err(AppError::Config(
                "reminder.batch_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn require_env(key: &str) -> Result<String> {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Config(format!("missing required env var: {key}")))
}

fn mask(value: &str) -> String {
    if value.len() > 4 {
        format!("{}****", &value[..4])
    } else {
        "****".into()
    }
}
