//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS` — safe to
//! re-run on every server startup. Produces a convergent result.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// Creates all four tables idempotently. The unique indexes are the sole
/// enforcement mechanism for event dedup, notification idempotency, and
/// reminder uniqueness. Safe to call on every startup.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS inbound_event (
    id                  TEXT PRIMARY KEY NOT NULL,
    external_event_id   TEXT NOT NULL,
    event_name          TEXT NOT NULL,
    phone               TEXT,
    payload_json        TEXT NOT NULL,
    created_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS message_log (
    id                      TEXT PRIMARY KEY NOT NULL,
    phone                   TEXT,
    template_name           TEXT,
    status                  TEXT NOT NULL CHECK(status IN ('success','failed')),
    provider_response       TEXT,
    conversation_event_id   TEXT,
    contact_id              TEXT,
    channel_id              TEXT,
    last_status             TEXT,
    last_status_at          TEXT,
    direction               TEXT,
    message_id              TEXT,
    error_code              INTEGER,
    error_reason            TEXT,
    created_at              TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sent_notification_lock (
    id                  TEXT PRIMARY KEY NOT NULL,
    reservation_number  TEXT NOT NULL,
    notification_type   TEXT NOT NULL,
    phone               TEXT NOT NULL,
    created_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS scheduled_message (
    id                  TEXT PRIMARY KEY NOT NULL,
    external_event_id   TEXT,
    reservation_number  TEXT NOT NULL,
    to_phone            TEXT NOT NULL,
    template_name       TEXT NOT NULL,
    params_json         TEXT NOT NULL,
    run_at              TEXT NOT NULL,
    status              TEXT NOT NULL CHECK(status IN ('pending','sent','failed','canceled')),
    attempts            INTEGER NOT NULL DEFAULT 0,
    last_error          TEXT,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_inbound_event_external_id
    ON inbound_event(external_event_id);
CREATE UNIQUE INDEX IF NOT EXISTS uq_notification_lock
    ON sent_notification_lock(reservation_number, notification_type, phone);
CREATE UNIQUE INDEX IF NOT EXISTS uq_scheduled_message_job
    ON scheduled_message(reservation_number, template_name, to_phone);

CREATE INDEX IF NOT EXISTS idx_message_log_conversation_event
    ON message_log(conversation_event_id);
CREATE INDEX IF NOT EXISTS idx_message_log_contact
    ON message_log(contact_id);
CREATE INDEX IF NOT EXISTS idx_message_log_channel
    ON message_log(channel_id);
CREATE INDEX IF NOT EXISTS idx_scheduled_message_due
    ON scheduled_message(status, run_at);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
