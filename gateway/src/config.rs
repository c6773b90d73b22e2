use anyhow::{Context, Result};
use std::env;

/// Scheduling-provider settings.
///
/// The provider versions its API per resource family, so each family carries
/// its own `cal-api-version` header value.
#[derive(Debug, Clone)]
pub struct CalConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub version_bookings: String,
    pub version_slots: String,
    pub version_event_types: String,
}

/// Process-wide configuration, built once at startup and passed into the
/// router state. Handlers never read the environment directly.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub cal: CalConfig,
    pub webhook_secret: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    /// Elevated-credential Postgres URL used for all appointment writes.
    /// Accepted under alternate names for backward compatibility.
    pub database_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid number")?;

        Ok(Self {
            port,
            cal: CalConfig {
                base_url: env_opt("CAL_API_BASE_URL")
                    .unwrap_or_else(|| "https://api.cal.com".to_string()),
                api_key: env_opt("CAL_API_KEY"),
                version_bookings: env_opt("CAL_API_VERSION_BOOKINGS")
                    .unwrap_or_else(|| "2024-08-13".to_string()),
                version_slots: env_opt("CAL_API_VERSION_SLOTS")
                    .unwrap_or_else(|| "2024-09-04".to_string()),
                version_event_types: env_opt("CAL_API_VERSION_EVENT_TYPES")
                    .unwrap_or_else(|| "2024-06-14".to_string()),
            },
            webhook_secret: env_opt("CAL_WEBHOOK_SECRET"),
            supabase_url: env_opt("SUPABASE_URL"),
            supabase_anon_key: env_opt("SUPABASE_ANON_KEY"),
            database_url: first_set(&["DATABASE_URL", "SERVICE_DATABASE_URL", "CAL_DATABASE_URL"]),
        })
    }
}

/// Read an env var, treating unset and empty as absent.
fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// First non-empty value among the given names, checked in order.
fn first_set(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| env_opt(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_set_prefers_earlier_names() {
        // Env mutation is process-global, so use names no other test touches.
        env::set_var("GW_TEST_FALLBACK_B", "second");
        assert_eq!(
            first_set(&["GW_TEST_FALLBACK_A", "GW_TEST_FALLBACK_B"]),
            Some("second".to_string())
        );

        env::set_var("GW_TEST_FALLBACK_A", "first");
        assert_eq!(
            first_set(&["GW_TEST_FALLBACK_A", "GW_TEST_FALLBACK_B"]),
            Some("first".to_string())
        );

        env::remove_var("GW_TEST_FALLBACK_A");
        env::remove_var("GW_TEST_FALLBACK_B");
    }

    #[test]
    fn empty_env_values_count_as_unset() {
        env::set_var("GW_TEST_EMPTY", "");
        assert_eq!(env_opt("GW_TEST_EMPTY"), None);
        env::remove_var("GW_TEST_EMPTY");
    }
}
