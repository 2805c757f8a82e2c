//! Event→template resolution and payload field extraction.
//!
//! Reservation payloads arrive with inconsistent key casing and several
//! alias spellings per field, so every lookup funnels through one
//! case-insensitive helper driven by a declarative alias table.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Client confirmation template; triggers admin fan-out and reminder
/// scheduling on a successful send.
pub const TPL_CONFIRMED: &str = "reservation_confirmed";
/// Client cancellation template; triggers reminder cancellation.
pub const TPL_CANCELLED: &str = "reservation_cancelled";
/// Scheduled reminder template.
pub const TPL_REMINDER: &str = "reservation_reminder";
/// Admin copy of a confirmation.
pub const TPL_ADMIN_CONFIRMED: &str = "admin_reservation_confirmed";
/// Zero-parameter welcome template.
pub const TPL_WELCOME: &str = "welcome";

/// Generic slot list used when a template has no registered spec, so the
/// caller still has a visible fallback path instead of a silent one.
const FALLBACK_SPEC: &[&str] = &["customer_name", "reservation_number"];

/// Map an event name to its template identifier.
///
/// Unknown event names yield `None`, meaning "unsupported".
#[must_use]
pub fn map_event_to_template(event_name: &str) -> Option<&'static str> {
    let template = match event_name {
        "ReservationCreatedEvent" => TPL_WELCOME,
        "ReservationConfirmedEvent"
        | "ReservationCompletedEvent"
        | "ReservationDoneEvent"
        | "ReservationUpdatedEvent" => TPL_CONFIRMED,
        "ReservationCancelledEvent" | "AdminReservationCancelledEvent" => TPL_CANCELLED,
        "ReservationReminderEvent" => TPL_REMINDER,
        "AdminReservationCreatedEvent" | "AdminReservationConfirmedEvent" => TPL_ADMIN_CONFIRMED,
        _ => return None,
    };
    Some(template)
}

/// Ordered parameter slots for a registered template.
///
/// A zero-slot spec (the welcome template) is valid and distinct from an
/// unknown template, which yields `None`.
#[must_use]
pub fn param_spec(template_name: &str) -> Option<&'static [&'static str]> {
    let spec: &[&str] = match template_name {
        TPL_CONFIRMED => &[
            "customer_name",
            "product_name",
            "reservation_date",
            "start_time",
            "end_time",
            "location_link",
            "location_text",
            "important_notes",
            "invoice_link",
            "meeting_link",
        ],
        TPL_REMINDER => &[
            "customer_name",
            "reservation_after_minutes",
            "allowed_late_minutes",
        ],
        TPL_CANCELLED => &["customer_name", "reservation_number", "cancel_reason"],
        TPL_ADMIN_CONFIRMED => &[
            "customer_name",
            "product_name",
            "reservation_date",
            "start_time",
            "end_time",
            "branch_name",
            "reservation_number",
        ],
        TPL_WELCOME => &[],
        _ => return None,
    };
    Some(spec)
}

/// Expected slot count for the pre-flight check, when the template has a
/// registered spec.
#[must_use]
pub fn expected_param_count(template_name: &str) -> Option<usize> {
    param_spec(template_name).map(<[&str]>::len)
}

/// Canonical field name → accepted payload alias spellings, looked up in
/// the event's `Data` object.
const DATA_FIELD_ALIASES: &[(&str, &[&str])] = &[
    ("reservation_number", &["number", "reservationNumber"]),
    ("product_name", &["productName"]),
    ("location_link", &["locationLink"]),
    ("location_text", &["locationText", "location"]),
    ("important_notes", &["importantNotes", "notes"]),
    ("invoice_link", &["invoiceLink"]),
    ("meeting_link", &["meetingLink"]),
    (
        "reservation_after_minutes",
        &["reservationAfterMinutes", "afterMinutes"],
    ),
    ("allowed_late_minutes", &["allowedLateMinutes"]),
    ("cancel_reason", &["cancelReason", "cancellationReason"]),
    ("branch_name", &["branchName"]),
];

/// Flat field values extracted from one reservation payload.
#[derive(Debug, Default, Clone)]
pub struct ExtractedFields {
    values: HashMap<String, String>,
    /// Raw ISO-8601 start instant, preserved for scheduling.
    pub start_raw: Option<String>,
    /// Raw customer phone before normalization.
    pub phone_raw: Option<String>,
}

impl ExtractedFields {
    /// Value for a canonical field name, empty string when absent.
    #[must_use]
    pub fn get(&self, name: &str) -> &str {
        self.values.get(name).map_or("", String::as_str)
    }

    /// Set or replace a field value (used for synthetic reminder fields).
    pub fn set(&mut self, name: &str, value: String) {
        self.values.insert(name.to_owned(), value);
    }
}

/// Pull every field the templates might need out of a reservation payload.
///
/// Key lookup is case-insensitive across the alias table; date/time fields
/// are additionally normalized to `YYYY-MM-DD` and 24-hour `HH:MM` forms,
/// while the raw start instant is kept aside for the scheduler.
#[must_use]
pub fn extract_fields(payload: &Value) -> ExtractedFields {
    let data = nested_object(payload, "data");
    let customer = data.and_then(|d| nested_object_of(d, "customer"));

    let mut fields = ExtractedFields::default();

    if let Some(customer) = customer {
        if let Some(name) = ci_string(customer, &["name"]) {
            fields.set("customer_name", name);
        }
        fields.phone_raw = ci_string(customer, &["mobileNumber", "phone"]);
    }

    if let Some(data) = data {
        for (canonical, aliases) in DATA_FIELD_ALIASES {
            if let Some(value) = ci_string(data, aliases) {
                fields.set(canonical, value);
            }
        }

        let start_raw = ci_string(data, &["startDate", "reservationDate"]);
        let start_time_raw = ci_string(data, &["startTime"]).or_else(|| start_raw.clone());
        let end_raw = ci_string(data, &["endTime", "endDate"]);

        if let Some(raw) = &start_raw {
            fields.set("reservation_date", format_date(raw));
        }
        if let Some(raw) = &start_time_raw {
            fields.set("start_time", format_time(raw));
        }
        if let Some(raw) = &end_raw {
            fields.set("end_time", format_time(raw));
        }
        fields.start_raw = start_raw;
    }

    debug!(field_count = fields.values.len(), "payload fields extracted");
    fields
}

/// Map a template's ordered slots onto extracted fields.
///
/// Empty values are replaced with `placeholder` — the provider rejects
/// empty body parameters. A template without a registered spec falls back
/// to a small generic slot list with a warning.
#[must_use]
pub fn build_parameters(
    template_name: &str,
    fields: &ExtractedFields,
    placeholder: &str,
) -> Vec<String> {
    let spec = param_spec(template_name).unwrap_or_else(|| {
        warn!(template = %template_name, "no parameter spec registered, using fallback slots");
        FALLBACK_SPEC
    });

    spec.iter()
        .map(|slot| {
            let value = fields.get(slot);
            if value.is_empty() {
                placeholder.to_owned()
            } else {
                value.to_owned()
            }
        })
        .collect()
}

/// Build the free-text message body used when the relay runs in text mode.
#[must_use]
pub fn build_text_message(event_name: &str, fields: &ExtractedFields) -> String {
    let name = non_empty_or(fields.get("customer_name"), "عميل");
    let number = non_empty_or(fields.get("reservation_number"), "-");
    let product = non_empty_or(fields.get("product_name"), "-");
    let date = non_empty_or(fields.get("reservation_date"), "-");

    let label = match event_name {
        "ReservationCreatedEvent" => "تم إنشاء حجز جديد",
        "ReservationConfirmedEvent" => "تم تأكيد الحجز",
        "ReservationCancelledEvent" => "تم إلغاء الحجز",
        "ReservationReminderEvent" => "تذكير بموعد الحجز",
        "ReservationCompletedEvent" => "تم اكتمال الحجز",
        "ReservationDoneEvent" => "تم إتمام الحجز",
        "ReservationUpdatedEvent" => "تم تحديث الحجز",
        other => other,
    };

    format!(
        "مرحباً {name}،\n{label}\nرقم الحجز: {number}\nالمنتج: {product}\nتاريخ البدء: {date}"
    )
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

/// Case-insensitive multi-alias lookup in a JSON object.
///
/// Each alias is tried as given, lower-cased, and with the first letter
/// capitalized; a final pass scans all keys case-insensitively.
pub(crate) fn ci_value<'a>(object: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    for alias in aliases {
        for variant in [(*alias).to_owned(), alias.to_lowercase(), capitalize(alias)] {
            if let Some(value) = object.get(&variant) {
                return Some(value);
            }
        }
    }
    for alias in aliases {
        let lower = alias.to_lowercase();
        if let Some((_, value)) = object.iter().find(|(k, _)| k.to_lowercase() == lower) {
            return Some(value);
        }
    }
    None
}

/// [`ci_value`] narrowed to non-empty scalar values rendered as strings.
pub(crate) fn ci_string(object: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    ci_value(object, aliases)
        .and_then(scalar_to_string)
        .filter(|s| !s.is_empty())
}

/// Render a scalar JSON value as a string; objects, arrays, and nulls are
/// not representable as template parameters.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn capitalize(key: &str) -> String {
    let mut chars = key.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().collect::<String>() + chars.as_str()
    })
}

fn nested_object<'a>(payload: &'a Value, key: &str) -> Option<&'a Map<String, Value>> {
    payload.as_object().and_then(|map| nested_object_of(map, key))
}

fn nested_object_of<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    ci_value(map, &[key]).and_then(Value::as_object)
}

/// Parse a payload date/time string into its wall-clock components.
///
/// Accepts RFC 3339 (offset preserved as given), bare date-times with or
/// without fractional seconds, and bare dates.
pub(crate) fn parse_wall_clock(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn format_date(raw: &str) -> String {
    parse_wall_clock(raw).map_or_else(|| raw.to_owned(), |dt| dt.format("%Y-%m-%d").to_string())
}

fn format_time(raw: &str) -> String {
    parse_wall_clock(raw).map_or_else(|| raw.to_owned(), |dt| dt.format("%H:%M").to_string())
}
