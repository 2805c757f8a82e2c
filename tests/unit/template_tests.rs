//! Unit tests for template resolution, field extraction, and parameter
//! assembly.

use booking_relay::relay::templates::{
    build_parameters, build_text_message, expected_param_count, extract_fields,
    map_event_to_template, param_spec, ExtractedFields, TPL_ADMIN_CONFIRMED, TPL_CANCELLED,
    TPL_CONFIRMED, TPL_REMINDER, TPL_WELCOME,
};
use serde_json::json;

#[test]
fn event_names_map_to_templates() {
    assert_eq!(map_event_to_template("ReservationCreatedEvent"), Some(TPL_WELCOME));
    assert_eq!(map_event_to_template("ReservationConfirmedEvent"), Some(TPL_CONFIRMED));
    assert_eq!(map_event_to_template("ReservationCompletedEvent"), Some(TPL_CONFIRMED));
    assert_eq!(map_event_to_template("ReservationDoneEvent"), Some(TPL_CONFIRMED));
    assert_eq!(map_event_to_template("ReservationUpdatedEvent"), Some(TPL_CONFIRMED));
    assert_eq!(map_event_to_template("ReservationCancelledEvent"), Some(TPL_CANCELLED));
    assert_eq!(map_event_to_template("AdminReservationCancelledEvent"), Some(TPL_CANCELLED));
    assert_eq!(map_event_to_template("ReservationReminderEvent"), Some(TPL_REMINDER));
    assert_eq!(map_event_to_template("AdminReservationCreatedEvent"), Some(TPL_ADMIN_CONFIRMED));
    assert_eq!(map_event_to_template("AdminReservationConfirmedEvent"), Some(TPL_ADMIN_CONFIRMED));
    assert_eq!(map_event_to_template("SomethingUnknown"), None);
}

#[test]
fn param_specs_have_expected_slot_counts() {
    assert_eq!(expected_param_count(TPL_CONFIRMED), Some(10));
    assert_eq!(expected_param_count(TPL_REMINDER), Some(3));
    assert_eq!(expected_param_count(TPL_CANCELLED), Some(3));
    assert_eq!(expected_param_count(TPL_ADMIN_CONFIRMED), Some(7));
    assert_eq!(expected_param_count(TPL_WELCOME), Some(0));
    assert_eq!(expected_param_count("no_such_template"), None);
}

#[test]
fn zero_slot_spec_is_distinct_from_unknown() {
    assert_eq!(param_spec(TPL_WELCOME), Some(&[][..]));
    assert_eq!(param_spec("no_such_template"), None);
}

#[test]
fn extract_fields_handles_mixed_key_casing() {
    let payload = json!({
        "Id": "evt-1",
        "EventName": "ReservationConfirmedEvent",
        "Data": {
            "Number": "R-100",
            "productName": "Meeting Room A",
            "StartDate": "2025-01-10T15:00:00",
            "startTime": "2025-01-10T15:00:00",
            "EndTime": "2025-01-10T16:30:00",
            "locationText": "Riyadh",
            "Customer": { "Name": "Alice", "MobileNumber": "0501234567" }
        }
    });

    let fields = extract_fields(&payload);
    assert_eq!(fields.get("reservation_number"), "R-100");
    assert_eq!(fields.get("product_name"), "Meeting Room A");
    assert_eq!(fields.get("customer_name"), "Alice");
    assert_eq!(fields.get("location_text"), "Riyadh");
    assert_eq!(fields.phone_raw.as_deref(), Some("0501234567"));
    assert_eq!(fields.start_raw.as_deref(), Some("2025-01-10T15:00:00"));
}

#[test]
fn date_and_time_fields_are_normalized() {
    let payload = json!({
        "data": {
            "startDate": "2025-01-10T15:00:00",
            "endTime": "2025-01-10T16:30:00"
        }
    });

    let fields = extract_fields(&payload);
    assert_eq!(fields.get("reservation_date"), "2025-01-10");
    assert_eq!(fields.get("start_time"), "15:00");
    assert_eq!(fields.get("end_time"), "16:30");
}

#[test]
fn numeric_scalars_are_rendered_as_strings() {
    let payload = json!({
        "data": { "number": 4711 }
    });

    let fields = extract_fields(&payload);
    assert_eq!(fields.get("reservation_number"), "4711");
}

#[test]
fn missing_field_yields_empty_string() {
    let fields = extract_fields(&json!({}));
    assert_eq!(fields.get("reservation_number"), "");
    assert!(fields.phone_raw.is_none());
    assert!(fields.start_raw.is_none());
}

#[test]
fn build_parameters_follows_slot_order() {
    let mut fields = ExtractedFields::default();
    fields.set("customer_name", "Alice".to_owned());
    fields.set("reservation_number", "R-100".to_owned());
    fields.set("cancel_reason", "no show".to_owned());

    let params = build_parameters(TPL_CANCELLED, &fields, "-");
    assert_eq!(params, vec!["Alice", "R-100", "no show"]);
}

#[test]
fn build_parameters_substitutes_placeholder_for_empty_slots() {
    let mut fields = ExtractedFields::default();
    fields.set("customer_name", "Alice".to_owned());

    let params = build_parameters(TPL_CONFIRMED, &fields, "-");
    assert_eq!(params.len(), 10);
    assert_eq!(params[0], "Alice");
    assert!(params[1..].iter().all(|p| p == "-"));
}

#[test]
fn build_parameters_unknown_template_uses_fallback_slots() {
    let mut fields = ExtractedFields::default();
    fields.set("customer_name", "Alice".to_owned());
    fields.set("reservation_number", "R-100".to_owned());

    let params = build_parameters("mystery_template", &fields, "-");
    assert_eq!(params, vec!["Alice", "R-100"]);
}

#[test]
fn welcome_template_builds_no_parameters() {
    let fields = ExtractedFields::default();
    assert!(build_parameters(TPL_WELCOME, &fields, "-").is_empty());
}

#[test]
fn text_message_includes_reservation_details() {
    let mut fields = ExtractedFields::default();
    fields.set("customer_name", "Alice".to_owned());
    fields.set("reservation_number", "R-100".to_owned());
    fields.set("product_name", "Meeting Room A".to_owned());
    fields.set("reservation_date", "2025-01-10".to_owned());

    let text = build_text_message("ReservationConfirmedEvent", &fields);
    assert!(text.contains("Alice"));
    assert!(text.contains("R-100"));
    assert!(text.contains("Meeting Room A"));
    assert!(text.contains("2025-01-10"));
}

#[test]
fn text_message_falls_back_for_missing_values() {
    let fields = ExtractedFields::default();
    let text = build_text_message("UnknownEvent", &fields);
    assert!(text.contains("UnknownEvent"));
    assert!(text.contains('-'));
}
