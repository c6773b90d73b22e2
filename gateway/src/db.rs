//! Appointment-mirror persistence.
//!
//! All writes in this module run over the elevated service-credential
//! connection pool, never the caller's own session: guest bookings must be
//! able to trigger inserts the guest could not author directly.

use diesel::prelude::*;
use diesel_async::{
    pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager, ManagerConfig},
    AsyncPgConnection, RunQueryDsl,
};
use uuid::Uuid;

use crate::models::{AppointmentChanges, NewAppointment, NewWebhookEvent};

pub type DbPool = Pool<AsyncPgConnection>;

async fn establish_tls_connection(config: String) -> diesel::ConnectionResult<AsyncPgConnection> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

    let (client, connection) = tokio_postgres::connect(&config, tls)
        .await
        .map_err(|e| diesel::ConnectionError::BadConnection(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    AsyncPgConnection::try_from(client).await
}

pub fn establish_connection_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let mut manager_config = ManagerConfig::default();
    manager_config.custom_setup =
        Box::new(|url| Box::pin(establish_tls_connection(url.to_string())));

    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new_with_config(
        database_url.to_string(),
        manager_config,
    );
    let pool = Pool::builder(config).build()?;

    Ok(pool)
}

// Appointment mirror operations
pub mod appointments {
    use super::*;

    /// Single-row insert at booking creation.
    pub async fn insert(conn: &mut AsyncPgConnection, row: NewAppointment) -> anyhow::Result<()> {
        use crate::schema::appointments::dsl::*;

        diesel::insert_into(appointments)
            .values(row)
            .execute(conn)
            .await?;

        Ok(())
    }

    /// Update every local row matching one of the provider booking ids.
    ///
    /// When no row matched (webhook arrived before the booking-creation
    /// write), fall back to an upsert keyed on the `cal_booking_id` unique
    /// index so a racing writer cannot produce a duplicate row.
    pub async fn update_by_booking_ids(
        conn: &mut AsyncPgConnection,
        booking_ids: &[String],
        mut changes: AppointmentChanges,
    ) -> anyhow::Result<usize> {
        use crate::schema::appointments::dsl::*;

        let Some(first_id) = booking_ids.first() else {
            return Ok(0);
        };
        if changes.is_empty() {
            return Ok(0);
        }
        changes.updated_at = Some(chrono::Utc::now());

        let updated = diesel::update(appointments.filter(cal_booking_id.eq_any(booking_ids)))
            .set(changes.clone())
            .execute(conn)
            .await?;
        if updated > 0 {
            return Ok(updated);
        }

        let fallback = changes.clone().into_insert(first_id.clone());
        diesel::insert_into(appointments)
            .values(fallback)
            .on_conflict(cal_booking_id)
            .do_update()
            .set(changes)
            .execute(conn)
            .await?;

        Ok(1)
    }
}

// Append-only webhook audit trail
pub mod webhook_events {
    use super::*;

    pub async fn append(conn: &mut AsyncPgConnection, row: NewWebhookEvent) -> anyhow::Result<()> {
        use crate::schema::webhook_events::dsl::*;

        diesel::insert_into(webhook_events)
            .values(row)
            .execute(conn)
            .await?;

        Ok(())
    }
}

// Role lookups, tolerant of the profiles -> perfiles schema rename
pub mod profiles {
    use super::*;

    /// Resolve the role attribute for a user.
    ///
    /// Reads `profiles.role` first; only when that query errors or finds no
    /// row does it fall back to the legacy `perfiles.rol` shape.
    pub async fn role_of(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
    ) -> anyhow::Result<Option<String>> {
        let primary = {
            use crate::schema::profiles::dsl::*;
            profiles
                .filter(id.eq(user_id))
                .select(role)
                .first::<Option<String>>(conn)
                .await
                .optional()
        };

        match primary {
            Ok(Some(role_value)) => Ok(role_value),
            Ok(None) => legacy_role_of(conn, user_id).await,
            Err(e) => {
                tracing::debug!("profiles lookup failed, trying perfiles: {}", e);
                legacy_role_of(conn, user_id).await
            }
        }
    }

    async fn legacy_role_of(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
    ) -> anyhow::Result<Option<String>> {
        use crate::schema::perfiles::dsl::*;

        let row = perfiles
            .filter(id.eq(user_id))
            .select(rol)
            .first::<Option<String>>(conn)
            .await
            .optional()?;

        Ok(row.flatten())
    }
}
