//! Unit tests for reminder run-time computation and job creation.

use std::sync::Arc;

use booking_relay::config::GlobalConfig;
use booking_relay::persistence::{db, schedule_repo::ScheduleRepo};
use booking_relay::relay::scheduler::{parse_start_instant, ReminderScheduler, ScheduleOutcome};
use booking_relay::relay::templates::ExtractedFields;
use chrono::{DateTime, Duration, Utc};

fn test_config() -> Arc<GlobalConfig> {
    let raw = r#"
send_mode = "template"

[booking]
tenant_id = "tenant-a"

[whatsapp]
base_url = "https://provider.test"
channel_id = "chan-1"
"#;
    Arc::new(GlobalConfig::from_toml_str(raw).expect("config"))
}

fn fields_with_start(start: &str) -> ExtractedFields {
    let mut fields = ExtractedFields::default();
    fields.set("customer_name", "Alice".to_owned());
    fields.start_raw = Some(start.to_owned());
    fields
}

#[test]
fn explicit_offset_is_honored() {
    let parsed = parse_start_instant("2025-01-10T15:00:00Z", 3).expect("parse");
    let expected: DateTime<Utc> = "2025-01-10T15:00:00Z".parse().expect("expected");
    assert_eq!(parsed, expected);

    let parsed = parse_start_instant("2025-01-10T15:00:00+02:00", 3).expect("parse");
    let expected: DateTime<Utc> = "2025-01-10T13:00:00Z".parse().expect("expected");
    assert_eq!(parsed, expected);
}

#[test]
fn naive_instant_uses_configured_offset() {
    let parsed = parse_start_instant("2025-01-10T14:40:00", 3).expect("parse");
    let expected: DateTime<Utc> = "2025-01-10T11:40:00Z".parse().expect("expected");
    assert_eq!(parsed, expected);
}

#[test]
fn bare_date_is_midnight_local() {
    let parsed = parse_start_instant("2025-01-10", 3).expect("parse");
    let expected: DateTime<Utc> = "2025-01-09T21:00:00Z".parse().expect("expected");
    assert_eq!(parsed, expected);
}

#[test]
fn garbage_start_is_unparseable() {
    assert!(parse_start_instant("tomorrow-ish", 3).is_none());
}

#[tokio::test]
async fn future_start_schedules_with_lead_offset() {
    let db = Arc::new(db::connect_memory().await.expect("db"));
    let scheduler = ReminderScheduler::new(Arc::clone(&db), test_config());

    let start = Utc::now() + Duration::hours(2);
    let fields = fields_with_start(&start.to_rfc3339());

    let outcome = scheduler
        .schedule_from_event("evt-1", "R-100", "966501234567", &fields)
        .await
        .expect("schedule");

    let ScheduleOutcome::Scheduled { id, run_at } = outcome else {
        panic!("expected Scheduled, got {outcome:?}");
    };
    let lead = run_at - (start - Duration::minutes(20));
    assert!(lead.num_seconds().abs() < 2, "run_at off by {lead}");

    let job = ScheduleRepo::new(db)
        .get_by_id(&id)
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(job.reservation_number, "R-100");
    assert_eq!(job.to_phone, "966501234567");
    assert_eq!(job.template_name, "reservation_reminder");
    // Synthetic lead/lateness values are baked into the stored parameters.
    let params: Vec<String> = serde_json::from_str(&job.params_json).expect("params");
    assert_eq!(params, vec!["Alice", "20", "15"]);
}

#[tokio::test]
async fn identical_reminder_is_already_scheduled() {
    let db = Arc::new(db::connect_memory().await.expect("db"));
    let scheduler = ReminderScheduler::new(db, test_config());

    let start = Utc::now() + Duration::hours(2);
    let fields = fields_with_start(&start.to_rfc3339());

    let first = scheduler
        .schedule_from_event("evt-1", "R-100", "966501234567", &fields)
        .await
        .expect("first");
    assert!(matches!(first, ScheduleOutcome::Scheduled { .. }));

    let second = scheduler
        .schedule_from_event("evt-2", "R-100", "966501234567", &fields)
        .await
        .expect("second");
    assert_eq!(second, ScheduleOutcome::AlreadyScheduled);
}

#[tokio::test]
async fn past_start_is_skipped() {
    let db = Arc::new(db::connect_memory().await.expect("db"));
    let scheduler = ReminderScheduler::new(db, test_config());

    let start = Utc::now() + Duration::minutes(10); // run time 10 min in the past
    let fields = fields_with_start(&start.to_rfc3339());

    let outcome = scheduler
        .schedule_from_event("evt-1", "R-100", "966501234567", &fields)
        .await
        .expect("schedule");
    assert_eq!(outcome, ScheduleOutcome::Skipped("not_in_future"));
}

#[tokio::test]
async fn missing_inputs_are_skipped_with_reasons() {
    let db = Arc::new(db::connect_memory().await.expect("db"));
    let scheduler = ReminderScheduler::new(db, test_config());

    let start = Utc::now() + Duration::hours(2);
    let fields = fields_with_start(&start.to_rfc3339());
    let outcome = scheduler
        .schedule_from_event("evt-1", "", "966501234567", &fields)
        .await
        .expect("no reservation");
    assert_eq!(outcome, ScheduleOutcome::Skipped("missing_reservation_number"));

    let outcome = scheduler
        .schedule_from_event("evt-2", "R-100", "966501234567", &ExtractedFields::default())
        .await
        .expect("no start");
    assert_eq!(outcome, ScheduleOutcome::Skipped("missing_start"));

    let outcome = scheduler
        .schedule_from_event("evt-3", "R-100", "966501234567", &fields_with_start("???"))
        .await
        .expect("bad start");
    assert_eq!(outcome, ScheduleOutcome::Skipped("unparseable_start"));
}

#[tokio::test]
async fn cancel_transitions_pending_reminders() {
    let db = Arc::new(db::connect_memory().await.expect("db"));
    let scheduler = ReminderScheduler::new(db, test_config());

    let start = Utc::now() + Duration::hours(2);
    let fields = fields_with_start(&start.to_rfc3339());
    scheduler
        .schedule_from_event("evt-1", "R-100", "966501234567", &fields)
        .await
        .expect("schedule");

    assert_eq!(scheduler.cancel_for_reservation("R-100").await.expect("cancel"), 1);
    assert_eq!(scheduler.cancel_for_reservation("R-100").await.expect("again"), 0);
}
