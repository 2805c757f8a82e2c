//! Unit tests for configuration parsing, defaults, and validation.

use booking_relay::config::{GlobalConfig, SendMode};

const MINIMAL: &str = r#"
send_mode = "template"

[booking]
tenant_id = "tenant-a"

[whatsapp]
base_url = "https://provider.test"
channel_id = "chan-1"
"#;

#[test]
fn minimal_config_parses_with_defaults() {
    let config = GlobalConfig::from_toml_str(MINIMAL).expect("parse");

    assert_eq!(config.http_port, 8080);
    assert_eq!(config.send_mode, SendMode::Template);
    assert_eq!(config.empty_param_placeholder, "-");
    assert!(config.admin_numbers.is_empty());
    assert_eq!(config.whatsapp.scope, "WhatsAppAPI");
    assert_eq!(config.whatsapp.language, "ar");
    assert_eq!(config.phone.country_code, "966");
    assert_eq!(config.phone.mobile_prefix, "5");
    assert_eq!(config.reminder.lead_minutes, 20);
    assert_eq!(config.reminder.allowed_late_minutes, 15);
    assert_eq!(config.reminder.naive_offset_hours, 3);
    assert_eq!(config.reminder.poll_seconds, 5);
    assert_eq!(config.reminder.batch_size, 50);
    assert_eq!(config.reminder.max_attempts, 5);
}

#[test]
fn explicit_values_override_defaults() {
    let raw = r#"
http_port = 9999
send_mode = "text"
empty_param_placeholder = "?"
admin_numbers = ["0555555555", "0566666666"]

[booking]
tenant_id = "tenant-b"

[whatsapp]
base_url = "https://provider.test"
channel_id = "chan-2"
language = "en"

[reminder]
lead_minutes = 30
max_attempts = 2
"#;
    let config = GlobalConfig::from_toml_str(raw).expect("parse");

    assert_eq!(config.http_port, 9999);
    assert_eq!(config.send_mode, SendMode::Text);
    assert_eq!(config.empty_param_placeholder, "?");
    assert_eq!(config.admin_numbers.len(), 2);
    assert_eq!(config.whatsapp.language, "en");
    assert_eq!(config.reminder.lead_minutes, 30);
    assert_eq!(config.reminder.max_attempts, 2);
    // Unspecified reminder keys keep their defaults.
    assert_eq!(config.reminder.poll_seconds, 5);
}

#[test]
fn empty_base_url_is_rejected() {
    let raw = MINIMAL.replace("https://provider.test", "");
    let err = GlobalConfig::from_toml_str(&raw).expect_err("must fail");
    assert!(err.to_string().contains("base_url"));
}

#[test]
fn empty_channel_id_is_rejected() {
    let raw = MINIMAL.replace("chan-1", "");
    let err = GlobalConfig::from_toml_str(&raw).expect_err("must fail");
    assert!(err.to_string().contains("channel_id"));
}

#[test]
fn zero_max_attempts_is_rejected() {
    let raw = format!("{MINIMAL}\n[reminder]\nmax_attempts = 0\n");
    let err = GlobalConfig::from_toml_str(&raw).expect_err("must fail");
    assert!(err.to_string().contains("max_attempts"));
}

#[test]
fn invalid_send_mode_is_rejected() {
    let raw = MINIMAL.replace("template", "carrier_pigeon");
    assert!(GlobalConfig::from_toml_str(&raw).is_err());
}

#[test]
fn secrets_never_come_from_toml() {
    let raw = format!("{MINIMAL}\n");
    let config = GlobalConfig::from_toml_str(&raw).expect("parse");
    assert!(config.whatsapp.client_id.is_empty());
    assert!(config.whatsapp.client_secret.is_empty());
    assert!(config.whatsapp.webhook_secret.is_empty());
    assert!(config.booking.basic_auth.is_empty());
}

#[test]
fn credential_loading_reads_environment() {
    // Single test owns these variables to avoid races between tests.
    std::env::set_var("WHATSAPP_CLIENT_ID", "client-1");
    std::env::set_var("WHATSAPP_CLIENT_SECRET", "secret-1");
    std::env::set_var("WHATSAPP_WEBHOOK_SECRET", "hook-1");
    std::env::remove_var("BOOKING_BASIC_AUTH");

    let mut config = GlobalConfig::from_toml_str(MINIMAL).expect("parse");
    config.load_credentials().expect("credentials");

    assert_eq!(config.whatsapp.client_id, "client-1");
    assert_eq!(config.whatsapp.client_secret, "secret-1");
    assert_eq!(config.whatsapp.webhook_secret, "hook-1");
    assert!(config.booking.basic_auth.is_empty());

    std::env::remove_var("WHATSAPP_CLIENT_ID");
    std::env::remove_var("WHATSAPP_CLIENT_SECRET");
    std::env::remove_var("WHATSAPP_WEBHOOK_SECRET");

    let mut config = GlobalConfig::from_toml_str(MINIMAL).expect("parse");
    let err = config.load_credentials().expect_err("must fail");
    assert!(err.to_string().contains("WHATSAPP_CLIENT_ID"));
}
