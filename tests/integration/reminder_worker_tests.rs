//! Reminder worker polling-pass tests: due selection, retry accounting,
//! exhaustion, and cancellation.

use std::sync::Arc;

use booking_relay::config::GlobalConfig;
use booking_relay::models::message_log::SendStatus;
use booking_relay::models::scheduled::{ScheduleStatus, ScheduledMessage};
use booking_relay::persistence::{db, message_log_repo::MessageLogRepo, schedule_repo::ScheduleRepo};
use booking_relay::provider::MessageSender;
use booking_relay::relay::worker::ReminderWorker;
use chrono::{Duration, Utc};

use super::test_helpers::{base_config, MockSender};

struct Harness {
    sender: Arc<MockSender>,
    schedules: ScheduleRepo,
    logs: MessageLogRepo,
    worker: ReminderWorker,
}

async fn setup(config: GlobalConfig) -> Harness {
    let db = Arc::new(db::connect_memory().await.expect("db"));
    let sender = Arc::new(MockSender::default());
    let worker = ReminderWorker::new(
        Arc::clone(&db),
        Arc::new(config),
        Arc::clone(&sender) as Arc<dyn MessageSender>,
    );
    Harness {
        schedules: ScheduleRepo::new(Arc::clone(&db)),
        logs: MessageLogRepo::new(db),
        sender,
        worker,
    }
}

fn due_job(reservation: &str, phone: &str) -> ScheduledMessage {
    ScheduledMessage::new(
        Some(format!("evt-{reservation}")),
        reservation.to_owned(),
        phone.to_owned(),
        "reservation_reminder".to_owned(),
        r#"["Alice","20","15"]"#.to_owned(),
        Utc::now() - Duration::minutes(1),
    )
}

#[tokio::test]
async fn due_job_is_sent_and_marked() {
    let h = setup(base_config()).await;
    let job = due_job("R-100", "966501234567");
    h.schedules.insert_if_absent(&job).await.expect("insert");

    assert_eq!(h.worker.tick().await.expect("tick"), 1);

    let sends = h.sender.recorded();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].template_name.as_deref(), Some("reservation_reminder"));
    assert_eq!(sends[0].to_phone, "966501234567");
    assert_eq!(sends[0].parameters, vec!["Alice", "20", "15"]);

    let settled = h.schedules.get_by_id(&job.id).await.expect("query").expect("exists");
    assert_eq!(settled.status, ScheduleStatus::Sent);
    assert_eq!(settled.attempts, 1);

    let log = h
        .logs
        .list_by_phone("966501234567")
        .await
        .expect("logs")
        .pop()
        .expect("one log");
    assert_eq!(log.status, SendStatus::Success);
    assert_eq!(log.conversation_event_id.as_deref(), Some("conv-1"));
}

#[tokio::test]
async fn future_job_is_left_untouched() {
    let h = setup(base_config()).await;
    let mut job = due_job("R-100", "966501234567");
    job.run_at = Utc::now() + Duration::hours(1);
    h.schedules.insert_if_absent(&job).await.expect("insert");

    assert_eq!(h.worker.tick().await.expect("tick"), 0);
    assert!(h.sender.recorded().is_empty());

    let fetched = h.schedules.get_by_id(&job.id).await.expect("query").expect("exists");
    assert_eq!(fetched.status, ScheduleStatus::Pending);
    assert_eq!(fetched.attempts, 0);
}

#[tokio::test]
async fn rejected_send_stays_pending_for_retry() {
    let h = setup(base_config()).await;
    h.sender.reject.store(true, std::sync::atomic::Ordering::SeqCst);

    let job = due_job("R-100", "966501234567");
    h.schedules.insert_if_absent(&job).await.expect("insert");
    h.worker.tick().await.expect("tick");

    let fetched = h.schedules.get_by_id(&job.id).await.expect("query").expect("exists");
    assert_eq!(fetched.status, ScheduleStatus::Pending);
    assert_eq!(fetched.attempts, 1);
    assert!(fetched.last_error.is_some());

    // A failed attempt is still a message log row.
    assert_eq!(h.logs.count().await.expect("count"), 1);
}

#[tokio::test]
async fn final_attempt_marks_the_job_failed() {
    let h = setup(base_config()).await;
    h.sender.reject.store(true, std::sync::atomic::Ordering::SeqCst);

    let mut job = due_job("R-100", "966501234567");
    job.attempts = 4; // one attempt left of the default five
    h.schedules.insert_if_absent(&job).await.expect("insert");
    h.worker.tick().await.expect("tick");

    let fetched = h.schedules.get_by_id(&job.id).await.expect("query").expect("exists");
    assert_eq!(fetched.status, ScheduleStatus::Failed);
    assert_eq!(fetched.attempts, 5);

    // Exhausted jobs never reappear in later passes.
    assert_eq!(h.worker.tick().await.expect("tick"), 0);
    assert_eq!(h.sender.recorded().len(), 1);
}

#[tokio::test]
async fn canceled_job_is_never_sent() {
    let h = setup(base_config()).await;
    let job = due_job("R-100", "966501234567");
    h.schedules.insert_if_absent(&job).await.expect("insert");
    h.schedules
        .cancel_pending("R-100", "reservation_reminder")
        .await
        .expect("cancel");

    assert_eq!(h.worker.tick().await.expect("tick"), 0);
    assert!(h.sender.recorded().is_empty());
}

#[tokio::test]
async fn unreadable_stored_params_consume_an_attempt() {
    let h = setup(base_config()).await;
    let mut job = due_job("R-100", "966501234567");
    job.params_json = "not json".to_owned();
    h.schedules.insert_if_absent(&job).await.expect("insert");
    h.worker.tick().await.expect("tick");

    // Refused before the provider was ever called.
    assert!(h.sender.recorded().is_empty());

    let fetched = h.schedules.get_by_id(&job.id).await.expect("query").expect("exists");
    assert_eq!(fetched.status, ScheduleStatus::Pending);
    assert_eq!(fetched.attempts, 1);
    assert!(fetched
        .last_error
        .as_deref()
        .expect("error")
        .contains("stored params unreadable"));
    assert_eq!(h.logs.count().await.expect("count"), 1);
}

#[tokio::test]
async fn wrong_parameter_count_is_refused_before_the_provider() {
    let h = setup(base_config()).await;
    let mut job = due_job("R-100", "966501234567");
    job.params_json = r#"["Alice"]"#.to_owned();
    h.schedules.insert_if_absent(&job).await.expect("insert");
    h.worker.tick().await.expect("tick");

    assert!(h.sender.recorded().is_empty());
    let fetched = h.schedules.get_by_id(&job.id).await.expect("query").expect("exists");
    assert!(fetched
        .last_error
        .as_deref()
        .expect("error")
        .contains("param_count_mismatch"));
}

#[tokio::test]
async fn one_bad_job_does_not_block_the_batch() {
    let h = setup(base_config()).await;

    let mut poison = due_job("R-1", "966501234501");
    poison.params_json = "not json".to_owned();
    poison.run_at = Utc::now() - Duration::minutes(10);
    h.schedules.insert_if_absent(&poison).await.expect("insert");

    let healthy = due_job("R-2", "966501234502");
    h.schedules.insert_if_absent(&healthy).await.expect("insert");

    assert_eq!(h.worker.tick().await.expect("tick"), 2);

    let sends = h.sender.recorded();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].to_phone, "966501234502");

    let sent = h.schedules.get_by_id(&healthy.id).await.expect("query").expect("exists");
    assert_eq!(sent.status, ScheduleStatus::Sent);
}
