// Diesel table definitions for the booking mirror.
//
// `appointments.cal_booking_id` carries a unique index so the zero-match
// update fallback can be expressed as ON CONFLICT DO UPDATE instead of a
// racy read-then-insert.

diesel::table! {
    appointments (id) {
        id -> Uuid,
        cal_booking_id -> Nullable<Varchar>,
        user_id -> Nullable<Uuid>,
        guest_name -> Nullable<Varchar>,
        guest_email -> Nullable<Varchar>,
        status -> Nullable<Varchar>,
        start_at -> Nullable<Timestamptz>,
        end_at -> Nullable<Timestamptz>,
        payload -> Nullable<Jsonb>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    webhook_events (id) {
        id -> Uuid,
        event -> Varchar,
        cal_booking_id -> Nullable<Varchar>,
        payload -> Nullable<Jsonb>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    profiles (id) {
        id -> Uuid,
        role -> Nullable<Varchar>,
    }
}

// Legacy name of the profile table from before the schema rename.
diesel::table! {
    perfiles (id) {
        id -> Uuid,
        rol -> Nullable<Varchar>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    appointments,
    webhook_events,
    profiles,
    perfiles,
);
