//! Action dispatch and state-transition handlers.
//!
//! One POST endpoint accepts `{action, payload?, ...}` envelopes and routes
//! to a fixed set of handlers. A request without an `action` is treated as a
//! webhook when it carries the provider signature header or a
//! `triggerEvent` field.

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::identity;
use crate::models::{AppointmentChanges, NewAppointment, NewWebhookEvent};
use crate::normalize;
use crate::webhook;
use crate::AppState;

pub async fn dispatch(
    State(state): State<AppState>,
    headers: HeaderMap,
    raw_body: Bytes,
) -> ApiResult<Response> {
    let body: Value =
        serde_json::from_slice(&raw_body).map_err(|_| ApiError::bad_request("Invalid JSON body"))?;
    let Value::Object(body) = body else {
        return Err(ApiError::bad_request("Invalid JSON body"));
    };

    let signature = headers
        .get(webhook::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let has_webhook_signal = signature.is_some() || body.contains_key("triggerEvent");

    let action = resolve_action(&body, has_webhook_signal)
        .ok_or_else(|| ApiError::bad_request("Missing action"))?;

    let input = effective_input(&body);
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match action.as_str() {
        "health" => Ok(Json(json!({"ok": true})).into_response()),
        "event_types" => {
            let data = state.cal.event_types(&input).await?;
            Ok(Json(json!({"data": data})).into_response())
        }
        "availability" => availability(&state, input).await,
        "create_booking" => create_booking(&state, auth_header, input).await,
        "list_bookings" => list_bookings(&state, auth_header, input).await,
        "cancel_booking" => cancel_booking(&state, input).await,
        "admin_list_bookings" => admin_list_bookings(&state, auth_header, input).await,
        "webhook" => handle_webhook(&state, &raw_body, signature, &body).await,
        _ => Err(ApiError::bad_request("Unknown action")),
    }
}

/// Pick the action name from the envelope. Absent, null, or empty actions
/// fall through to `webhook` when a webhook signal is present; a non-string
/// action is malformed and never inferred.
fn resolve_action(body: &Map<String, Value>, has_webhook_signal: bool) -> Option<String> {
    match body.get("action") {
        Some(Value::String(action)) if !action.is_empty() => Some(action.clone()),
        None | Some(Value::Null) | Some(Value::String(_)) => {
            has_webhook_signal.then(|| "webhook".to_string())
        }
        Some(_) => None,
    }
}

/// The handler input: the nested `payload` object when present, otherwise
/// the remaining top-level fields minus the envelope keys.
fn effective_input(body: &Map<String, Value>) -> Map<String, Value> {
    if let Some(Value::Object(payload)) = body.get("payload") {
        return payload.clone();
    }
    let mut rest = body.clone();
    rest.remove("action");
    rest.remove("payload");
    rest
}

async fn availability(state: &AppState, mut input: Map<String, Value>) -> ApiResult<Response> {
    normalize::canonicalize_slot_query(&mut input);
    let data = state.cal.slots(&input).await?;
    Ok(Json(json!({"data": data})).into_response())
}

async fn create_booking(
    state: &AppState,
    auth_header: Option<&str>,
    input: Map<String, Value>,
) -> ApiResult<Response> {
    let booking = state
        .cal
        .create_booking(&Value::Object(input.clone()))
        .await?;

    // The provider booking exists at this point; a mirror-write failure must
    // not make the user-visible confirmation disappear.
    let warning = match persist_created_booking(state, auth_header, &input, &booking).await {
        Ok(()) => None,
        Err(e) => {
            tracing::error!(
                "Booking created in Cal.com but local persistence failed: {:#}",
                e
            );
            Some("BOOKING_CREATED_BUT_PERSIST_FAILED")
        }
    };

    Ok(Json(json!({"data": booking, "warning": warning})).into_response())
}

async fn persist_created_booking(
    state: &AppState,
    auth_header: Option<&str>,
    input: &Map<String, Value>,
    booking: &Value,
) -> anyhow::Result<()> {
    let pool = state
        .db
        .as_ref()
        .context("appointment persistence is not configured")?;
    let identity = identity::resolve_user(&state.http, &state.config, auth_header).await;

    let attendee = input.get("attendee");
    let attendee_field = |name: &str| {
        attendee
            .and_then(|a| a.get(name))
            .and_then(|v| v.as_str())
            .map(String::from)
    };
    let guest_name = attendee_field("name");
    let guest_email = attendee_field("email").or_else(|| identity.email.clone());

    let booking_data = booking.get("data");
    let booking_id = normalize::extract_booking_ids(booking_data).into_iter().next();
    let (start_at, end_at) = booking_data
        .map(|data| {
            (
                normalize::event_time(data, "start", "startTime"),
                normalize::event_time(data, "end", "endTime"),
            )
        })
        .unwrap_or((None, None));

    let mut conn = pool.get().await?;
    db::appointments::insert(
        &mut conn,
        NewAppointment {
            cal_booking_id: booking_id,
            user_id: identity.user_id,
            guest_name,
            guest_email,
            status: Some("scheduled".to_string()),
            start_at,
            end_at,
            payload: Some(booking.clone()),
            updated_at: None,
        },
    )
    .await
}

async fn list_bookings(
    state: &AppState,
    auth_header: Option<&str>,
    mut input: Map<String, Value>,
) -> ApiResult<Response> {
    let identity = identity::resolve_user(&state.http, &state.config, auth_header).await;
    let email = match (&identity.user_id, identity.email) {
        (Some(_), Some(email)) => email,
        _ => return Err(ApiError::Unauthorized("Authentication required".to_string())),
    };

    input.insert("attendeeEmail".to_string(), Value::String(email));
    let data = state.cal.list_bookings(&input).await?;
    Ok(Json(json!({"data": data})).into_response())
}

async fn cancel_booking(state: &AppState, input: Map<String, Value>) -> ApiResult<Response> {
    let booking_uid = input
        .get("bookingUid")
        .and_then(|v| v.as_str())
        .filter(|uid| !uid.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing bookingUid"))?
        .to_string();

    let mut cancel_body = Map::new();
    if let Some(reason) = input.get("cancellationReason").and_then(|v| v.as_str()) {
        let reason = reason.trim();
        if !reason.is_empty() {
            cancel_body.insert(
                "cancellationReason".to_string(),
                Value::String(reason.to_string()),
            );
        }
    }
    if let Some(cascade) = input
        .get("cancelSubsequentBookings")
        .and_then(Value::as_bool)
    {
        cancel_body.insert("cancelSubsequentBookings".to_string(), Value::Bool(cascade));
    }
    let cancel_body = (!cancel_body.is_empty()).then(|| Value::Object(cancel_body));

    let data = state
        .cal
        .cancel_booking(&booking_uid, cancel_body.as_ref())
        .await?;

    // Best-effort mirror update; the provider-side cancellation already
    // happened and the webhook will reconcile any miss.
    if let Some(pool) = state.db.as_ref() {
        let changes = AppointmentChanges {
            status: Some("cancelled".to_string()),
            payload: Some(data.clone()),
            ..Default::default()
        };
        if let Err(e) = mirror_cancellation(pool, &booking_uid, changes).await {
            tracing::error!(
                "Booking {} cancelled upstream but local status update failed: {:#}",
                booking_uid,
                e
            );
        }
    }

    Ok(Json(json!({"data": data})).into_response())
}

async fn mirror_cancellation(
    pool: &crate::db::DbPool,
    booking_uid: &str,
    changes: AppointmentChanges,
) -> anyhow::Result<()> {
    let mut conn = pool.get().await?;
    db::appointments::update_by_booking_ids(&mut conn, &[booking_uid.to_string()], changes).await?;
    Ok(())
}

async fn admin_list_bookings(
    state: &AppState,
    auth_header: Option<&str>,
    input: Map<String, Value>,
) -> ApiResult<Response> {
    let identity = identity::resolve_user(&state.http, &state.config, auth_header).await;
    if !identity::is_admin(state.db.as_ref(), identity.user_id).await {
        return Err(ApiError::Forbidden("Admin only".to_string()));
    }

    let data = state.cal.list_bookings(&input).await?;
    Ok(Json(json!({"data": data})).into_response())
}

async fn handle_webhook(
    state: &AppState,
    raw_body: &[u8],
    signature: Option<&str>,
    body: &Map<String, Value>,
) -> ApiResult<Response> {
    if !webhook::verify_signature(state.config.webhook_secret.as_deref(), raw_body, signature) {
        return Err(ApiError::Unauthorized(
            "Invalid webhook signature".to_string(),
        ));
    }
    let Some(pool) = state.db.as_ref() else {
        return Err(ApiError::Config("Server not configured".to_string()));
    };

    let event = body
        .get("triggerEvent")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let payload = body.get("payload");
    let booking_ids = normalize::extract_booking_ids(payload);
    let full_body = Value::Object(body.clone());

    let mut conn = pool.get().await?;
    db::webhook_events::append(
        &mut conn,
        NewWebhookEvent {
            event: event.clone(),
            cal_booking_id: booking_ids.first().cloned(),
            payload: Some(full_body.clone()),
        },
    )
    .await?;

    if !booking_ids.is_empty() {
        let status = normalize::normalize_status(payload.and_then(|p| p.get("status")), &event);
        let (guest_name, guest_email, start_at, end_at) = match payload {
            Some(p) => {
                let (name, email) = normalize::first_attendee(p);
                (
                    name,
                    email,
                    normalize::event_time(p, "startTime", "start"),
                    normalize::event_time(p, "endTime", "end"),
                )
            }
            None => (None, None, None, None),
        };

        db::appointments::update_by_booking_ids(
            &mut conn,
            &booking_ids,
            AppointmentChanges {
                status,
                payload: Some(full_body),
                start_at,
                end_at,
                guest_name,
                guest_email,
                updated_at: None,
            },
        )
        .await?;
    }

    Ok(Json(json!({"ok": true})).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn explicit_action_wins() {
        let body = as_map(json!({"action": "health", "triggerEvent": "BOOKING_CREATED"}));
        assert_eq!(resolve_action(&body, true), Some("health".to_string()));
    }

    #[test]
    fn webhook_inferred_from_signal() {
        let body = as_map(json!({"triggerEvent": "BOOKING_CREATED"}));
        assert_eq!(resolve_action(&body, true), Some("webhook".to_string()));

        let empty_action = as_map(json!({"action": "", "triggerEvent": "X"}));
        assert_eq!(resolve_action(&empty_action, true), Some("webhook".to_string()));
    }

    #[test]
    fn missing_action_without_signal_is_rejected() {
        let body = as_map(json!({"foo": "bar"}));
        assert_eq!(resolve_action(&body, false), None);
    }

    #[test]
    fn non_string_action_is_never_inferred() {
        let body = as_map(json!({"action": 5, "triggerEvent": "X"}));
        assert_eq!(resolve_action(&body, true), None);
    }

    #[test]
    fn nested_payload_becomes_the_input() {
        let body = as_map(json!({
            "action": "availability",
            "payload": {"eventTypeId": 12},
            "ignored": true
        }));
        let input = effective_input(&body);
        assert_eq!(input.get("eventTypeId"), Some(&json!(12)));
        assert!(!input.contains_key("ignored"));
    }

    #[test]
    fn top_level_fields_used_when_no_payload() {
        let body = as_map(json!({"action": "availability", "eventTypeId": 12}));
        let input = effective_input(&body);
        assert_eq!(input.get("eventTypeId"), Some(&json!(12)));
        assert!(!input.contains_key("action"));
    }

    #[test]
    fn non_object_payload_falls_back_to_rest() {
        let body = as_map(json!({"action": "availability", "payload": "junk", "eventTypeId": 7}));
        let input = effective_input(&body);
        assert_eq!(input.get("eventTypeId"), Some(&json!(7)));
        assert!(!input.contains_key("payload"));
    }
}
