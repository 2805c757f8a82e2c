//! Delivery-status correlation against stored message logs.

use std::sync::Arc;

use booking_relay::models::message_log::{MessageLog, SendStatus};
use booking_relay::persistence::{db, message_log_repo::MessageLogRepo, SqlitePool};
use booking_relay::relay::status::{CorrelationOutcome, StatusCorrelator};
use chrono::{Duration, Utc};
use serde_json::json;

async fn setup() -> (Arc<SqlitePool>, MessageLogRepo, StatusCorrelator) {
    let db = Arc::new(db::connect_memory().await.expect("db"));
    let repo = MessageLogRepo::new(Arc::clone(&db));
    let correlator = StatusCorrelator::new(Arc::clone(&db));
    (db, repo, correlator)
}

fn sent_log(phone: &str, conversation: Option<&str>) -> MessageLog {
    let mut log = MessageLog::new(
        Some(phone.to_owned()),
        Some("reservation_confirmed".to_owned()),
        SendStatus::Success,
    );
    log.conversation_event_id = conversation.map(ToOwned::to_owned);
    log.contact_id = Some(format!("contact-{phone}"));
    log.channel_id = Some("chan-1".to_owned());
    log.last_status = Some("sent".to_owned());
    log
}

#[tokio::test]
async fn exact_conversation_id_match_updates_in_place() {
    let (_db, repo, correlator) = setup().await;
    let log = sent_log("966501234567", Some("conv-1"));
    repo.create(&log).await.expect("create");

    let callback = json!({
        "conversationEventId": "conv-1",
        "status": "delivered",
        "messageId": "msg-1",
        "timestamp": "2025-01-10T12:00:00Z"
    });
    let outcome = correlator.apply(&callback, "req-1").await.expect("apply");
    assert_eq!(
        outcome,
        CorrelationOutcome::Updated {
            message_log_id: log.id.clone()
        }
    );

    let updated = repo.get_by_id(&log.id).await.expect("query").expect("exists");
    assert_eq!(updated.last_status.as_deref(), Some("delivered"));
    assert_eq!(updated.message_id.as_deref(), Some("msg-1"));
    assert!(updated.last_status_at.is_some());
    // Fields absent from the callback keep their stored values.
    assert_eq!(updated.phone.as_deref(), Some("966501234567"));
    assert_eq!(updated.contact_id.as_deref(), Some("contact-966501234567"));
    assert_eq!(updated.status, SendStatus::Success);
}

#[tokio::test]
async fn partial_callback_never_clears_stored_values() {
    let (_db, repo, correlator) = setup().await;
    let mut log = sent_log("966501234567", Some("conv-1"));
    log.error_reason = Some("previous reason".to_owned());
    repo.create(&log).await.expect("create");

    let callback = json!({ "conversationEventId": "conv-1", "status": "read" });
    correlator.apply(&callback, "req-1").await.expect("apply");

    let updated = repo.get_by_id(&log.id).await.expect("query").expect("exists");
    assert_eq!(updated.last_status.as_deref(), Some("read"));
    assert_eq!(updated.error_reason.as_deref(), Some("previous reason"));
}

#[tokio::test]
async fn contact_channel_fallback_matches_most_recent_send() {
    let (_db, repo, correlator) = setup().await;

    let mut older = sent_log("966501234567", None);
    older.created_at = Utc::now() - Duration::hours(2);
    repo.create(&older).await.expect("create older");
    let newer = sent_log("966501234567", None);
    repo.create(&newer).await.expect("create newer");

    let callback = json!({
        "contactId": "contact-966501234567",
        "channelId": "chan-1",
        "status": "delivered"
    });
    let outcome = correlator.apply(&callback, "req-1").await.expect("apply");
    assert_eq!(
        outcome,
        CorrelationOutcome::Updated {
            message_log_id: newer.id.clone()
        }
    );

    let untouched = repo.get_by_id(&older.id).await.expect("query").expect("exists");
    assert_eq!(untouched.last_status.as_deref(), Some("sent"));
}

#[tokio::test]
async fn fallback_ignores_sends_older_than_a_day() {
    let (_db, repo, correlator) = setup().await;

    let mut stale = sent_log("966501234567", None);
    stale.created_at = Utc::now() - Duration::days(2);
    repo.create(&stale).await.expect("create");

    let callback = json!({
        "contactId": "contact-966501234567",
        "channelId": "chan-1",
        "status": "delivered"
    });
    let outcome = correlator.apply(&callback, "req-1").await.expect("apply");
    assert!(matches!(outcome, CorrelationOutcome::Inserted { .. }));
    assert_eq!(repo.count().await.expect("count"), 2);
}

#[tokio::test]
async fn unmatched_callback_is_kept_as_shell_row() {
    let (_db, repo, correlator) = setup().await;

    let callback = json!({
        "conversationEventId": "conv-unknown",
        "contactId": "contact-x",
        "channelId": "chan-1",
        "status": "delivered"
    });
    let outcome = correlator.apply(&callback, "req-1").await.expect("apply");
    let CorrelationOutcome::Inserted { message_log_id } = outcome else {
        panic!("expected Inserted, got {outcome:?}");
    };

    let shell = repo
        .get_by_id(&message_log_id)
        .await
        .expect("query")
        .expect("exists");
    // "delivered" classifies the shell as a success.
    assert_eq!(shell.status, SendStatus::Success);
    assert_eq!(shell.conversation_event_id.as_deref(), Some("conv-unknown"));
    assert_eq!(shell.last_status.as_deref(), Some("delivered"));
    assert!(shell.phone.is_none());
}

#[tokio::test]
async fn unmatched_failure_status_is_a_failed_shell_row() {
    let (_db, repo, correlator) = setup().await;

    let callback = json!({
        "conversationEventId": "conv-unknown",
        "status": "undeliverable",
        "errorCode": 131_026,
        "errorReason": "recipient unreachable"
    });
    let outcome = correlator.apply(&callback, "req-1").await.expect("apply");
    let CorrelationOutcome::Inserted { message_log_id } = outcome else {
        panic!("expected Inserted, got {outcome:?}");
    };

    let shell = repo
        .get_by_id(&message_log_id)
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(shell.status, SendStatus::Failed);
    assert_eq!(shell.error_code, Some(131_026));
    assert_eq!(shell.error_reason.as_deref(), Some("recipient unreachable"));
}
