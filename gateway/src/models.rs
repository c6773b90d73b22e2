// Database models for Diesel
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

/// Insertable appointment row, written at booking creation or as the upsert
/// fallback when a webhook references a booking we have not seen.
#[derive(Debug, Clone, Default, Insertable)]
#[diesel(table_name = crate::schema::appointments)]
pub struct NewAppointment {
    pub cal_booking_id: Option<String>,
    pub user_id: Option<Uuid>,
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
    pub status: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub payload: Option<serde_json::Value>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Partial update applied to every local row matching a set of booking ids.
/// `None` fields are left untouched, never cleared: a sparse webhook payload
/// must not erase values written at booking creation.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = crate::schema::appointments)]
pub struct AppointmentChanges {
    pub status: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AppointmentChanges {
    /// True when no domain field would change. `updated_at` is bookkeeping
    /// stamped by the persistence layer and does not count.
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.payload.is_none()
            && self.start_at.is_none()
            && self.end_at.is_none()
            && self.guest_name.is_none()
            && self.guest_email.is_none()
    }

    /// Row to insert when no existing appointment matched the update.
    pub fn into_insert(self, booking_id: String) -> NewAppointment {
        NewAppointment {
            cal_booking_id: Some(booking_id),
            user_id: None,
            guest_name: self.guest_name,
            guest_email: self.guest_email,
            status: self.status.or_else(|| Some("scheduled".to_string())),
            start_at: self.start_at,
            end_at: self.end_at,
            payload: self.payload.or_else(|| Some(serde_json::json!({}))),
            updated_at: self.updated_at,
        }
    }
}

/// Append-only webhook audit row.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::webhook_events)]
pub struct NewWebhookEvent {
    pub event: String,
    pub cal_booking_id: Option<String>,
    pub payload: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_changeset_is_detected() {
        assert!(AppointmentChanges::default().is_empty());
        assert!(!AppointmentChanges {
            status: Some("cancelled".to_string()),
            ..Default::default()
        }
        .is_empty());
    }

    #[test]
    fn bookkeeping_timestamp_alone_counts_as_empty() {
        let changes = AppointmentChanges {
            updated_at: Some(Utc::now()),
            ..Default::default()
        };
        assert!(changes.is_empty());
    }

    #[test]
    fn fallback_insert_defaults_status_and_payload() {
        let row = AppointmentChanges::default().into_insert("abc123".to_string());
        assert_eq!(row.cal_booking_id.as_deref(), Some("abc123"));
        assert_eq!(row.status.as_deref(), Some("scheduled"));
        assert_eq!(row.payload, Some(serde_json::json!({})));
    }

    #[test]
    fn fallback_insert_keeps_explicit_fields() {
        let changes = AppointmentChanges {
            status: Some("cancelled".to_string()),
            guest_email: Some("ana@x.com".to_string()),
            ..Default::default()
        };
        let row = changes.into_insert("b-1".to_string());
        assert_eq!(row.status.as_deref(), Some("cancelled"));
        assert_eq!(row.guest_email.as_deref(), Some("ana@x.com"));
    }
}
