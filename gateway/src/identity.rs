//! Caller identity resolution and admin gating.
//!
//! The gateway is not the identity authority: it only asks the identity
//! service who a bearer token belongs to. Every failure on that path is a
//! soft-fail to anonymous so guest-booking flows keep working without
//! authentication.

use serde::Deserialize;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::{self, DbPool};

/// Resolved caller, possibly anonymous.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some() && self.email.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: Uuid,
    email: Option<String>,
}

/// Resolve the inbound `Authorization` header to a user id and email.
///
/// Returns anonymous when the header is absent, the identity service is not
/// configured, or resolution fails for any reason. Never errors.
pub async fn resolve_user(
    http: &reqwest::Client,
    config: &AppConfig,
    auth_header: Option<&str>,
) -> Identity {
    let (Some(base_url), Some(anon_key)) = (
        config.supabase_url.as_deref(),
        config.supabase_anon_key.as_deref(),
    ) else {
        return Identity::anonymous();
    };
    let Some(auth_header) = auth_header.filter(|h| !h.is_empty()) else {
        return Identity::anonymous();
    };

    match fetch_user(http, base_url, anon_key, auth_header).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!("Failed to resolve user from request: {}", e);
            Identity::anonymous()
        }
    }
}

async fn fetch_user(
    http: &reqwest::Client,
    base_url: &str,
    anon_key: &str,
    auth_header: &str,
) -> anyhow::Result<Identity> {
    let endpoint = format!("{}/auth/v1/user", base_url.trim_end_matches('/'));
    let res = http
        .get(&endpoint)
        .header(reqwest::header::AUTHORIZATION, auth_header)
        .header("apikey", anon_key)
        .send()
        .await?;

    if !res.status().is_success() {
        anyhow::bail!("identity service returned {}", res.status());
    }

    let user: AuthUser = res.json().await?;
    Ok(Identity {
        user_id: Some(user.id),
        email: user.email,
    })
}

/// Whether the given user carries the `admin` role.
///
/// Reads the role through the two-shape profile lookup in [`db::profiles`].
/// Returns `false` on any failure, never errors.
pub async fn is_admin(pool: Option<&DbPool>, user_id: Option<Uuid>) -> bool {
    let (Some(pool), Some(user_id)) = (pool, user_id) else {
        return false;
    };

    let mut conn = match pool.get().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!("Admin check skipped, no database connection: {}", e);
            return false;
        }
    };

    match db::profiles::role_of(&mut conn, user_id).await {
        Ok(role) => role.as_deref() == Some("admin"),
        Err(e) => {
            tracing::warn!("Admin role lookup failed for {}: {}", user_id, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_identity_is_not_authenticated() {
        assert!(!Identity::anonymous().is_authenticated());
    }

    #[test]
    fn identity_requires_both_id_and_email() {
        let id_only = Identity {
            user_id: Some(Uuid::new_v4()),
            email: None,
        };
        assert!(!id_only.is_authenticated());

        let full = Identity {
            user_id: Some(Uuid::new_v4()),
            email: Some("ana@x.com".to_string()),
        };
        assert!(full.is_authenticated());
    }

    #[tokio::test]
    async fn unconfigured_identity_service_resolves_anonymous() {
        let config = AppConfig {
            port: 3000,
            cal: crate::config::CalConfig {
                base_url: "https://api.cal.com".to_string(),
                api_key: None,
                version_bookings: "v".to_string(),
                version_slots: "v".to_string(),
                version_event_types: "v".to_string(),
            },
            webhook_secret: None,
            supabase_url: None,
            supabase_anon_key: None,
            database_url: None,
        };
        let http = reqwest::Client::new();

        let identity = resolve_user(&http, &config, Some("Bearer abc")).await;
        assert!(!identity.is_authenticated());
    }

    #[tokio::test]
    async fn anonymous_user_is_never_admin() {
        assert!(!is_admin(None, None).await);
        assert!(!is_admin(None, Some(Uuid::new_v4())).await);
    }
}
