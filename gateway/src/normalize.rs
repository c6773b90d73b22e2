//! Normalization layer for loosely-shaped provider payloads.
//!
//! The scheduling provider varies its field naming across API versions and
//! webhook trigger events (`start` vs `startTime`, `uid` vs `bookingUid`,
//! status text vs trigger-event names). Everything here maps those variants
//! into one canonical shape before any handler logic touches the data; the
//! raw payload is retained opaquely for audit but never relied on
//! structurally elsewhere.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Collect candidate provider booking ids from a payload, deduplicated in
/// first-seen order. Tolerates `bookingUid`, `uid`, `id`, `bookingId`, and
/// the same fields nested under a `booking` object.
pub fn extract_booking_ids(payload: Option<&Value>) -> Vec<String> {
    let Some(payload) = payload else {
        return Vec::new();
    };

    let booking = payload.get("booking");
    let candidates = [
        payload.get("bookingUid"),
        payload.get("uid"),
        payload.get("id"),
        payload.get("bookingId"),
        booking.and_then(|b| b.get("uid")),
        booking.and_then(|b| b.get("id")),
    ];

    let mut ids = Vec::new();
    for candidate in candidates.into_iter().flatten() {
        let Some(id) = id_string(candidate) else {
            continue;
        };
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Canonical local status from explicit provider status text, or inferred
/// from the webhook trigger-event name when the text is absent. `None`
/// means no status change should be attempted.
pub fn normalize_status(explicit: Option<&Value>, trigger_event: &str) -> Option<String> {
    if let Some(Value::String(s)) = explicit {
        if !s.trim().is_empty() {
            return Some(s.to_lowercase());
        }
    }

    let event = trigger_event.to_uppercase();
    if event.contains("CANCEL") {
        Some("cancelled".to_string())
    } else if event.contains("RESCHEDULE") {
        Some("rescheduled".to_string())
    } else if event.contains("REJECT") {
        Some("rejected".to_string())
    } else if event.contains("CREATED") || event.contains("BOOKED") {
        Some("scheduled".to_string())
    } else {
        None
    }
}

/// Rewrite legacy `startTime`/`endTime` slot-query keys to the canonical
/// `start`/`end` the provider expects, without clobbering canonical keys the
/// caller already supplied.
pub fn canonicalize_slot_query(query: &mut Map<String, Value>) {
    rename_if_absent(query, "startTime", "start");
    rename_if_absent(query, "endTime", "end");
}

fn rename_if_absent(map: &mut Map<String, Value>, legacy: &str, canonical: &str) {
    if !map.contains_key(legacy) {
        return;
    }
    if map.contains_key(canonical) {
        map.remove(legacy);
        return;
    }
    if let Some(value) = map.remove(legacy) {
        map.insert(canonical.to_string(), value);
    }
}

/// Slot boundary from a payload, preferring the webhook's `startTime`-style
/// field over the bookings API's `start`-style field. Unparsable timestamps
/// are dropped rather than guessed at.
pub fn event_time(payload: &Value, primary: &str, fallback: &str) -> Option<DateTime<Utc>> {
    payload
        .get(primary)
        .or_else(|| payload.get(fallback))
        .and_then(parse_timestamp)
}

pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Name and email of the first attendee in a webhook payload.
pub fn first_attendee(payload: &Value) -> (Option<String>, Option<String>) {
    let attendee = payload
        .get("attendees")
        .and_then(|a| a.as_array())
        .and_then(|a| a.first());
    let field = |name: &str| {
        attendee
            .and_then(|a| a.get(name))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    };
    (field("name"), field("email"))
}
