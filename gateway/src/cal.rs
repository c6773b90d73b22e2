//! Thin HTTP client for the Cal.com v2 API.
//!
//! Every call carries the server-held bearer key and the per-resource-family
//! `cal-api-version` header. Non-success responses are surfaced as
//! [`ApiError::Upstream`] with the provider's status and body attached so the
//! dispatcher can hand them back to the caller verbatim.

use reqwest::Method;
use serde_json::{Map, Value};

use crate::config::CalConfig;
use crate::error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct CalClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    version_bookings: String,
    version_slots: String,
    version_event_types: String,
}

impl CalClient {
    pub fn new(http: reqwest::Client, config: &CalConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            version_bookings: config.version_bookings.clone(),
            version_slots: config.version_slots.clone(),
            version_event_types: config.version_event_types.clone(),
        }
    }

    /// `GET /v2/event-types`, optionally filtered by query params.
    pub async fn event_types(&self, query: &Map<String, Value>) -> ApiResult<Value> {
        self.request(
            Method::GET,
            "/v2/event-types",
            &self.version_event_types,
            Some(query),
            None,
        )
        .await
    }

    /// `GET /v2/slots` for an event type and time range.
    pub async fn slots(&self, query: &Map<String, Value>) -> ApiResult<Value> {
        self.request(
            Method::GET,
            "/v2/slots",
            &self.version_slots,
            Some(query),
            None,
        )
        .await
    }

    /// `POST /v2/bookings`.
    pub async fn create_booking(&self, body: &Value) -> ApiResult<Value> {
        self.request(
            Method::POST,
            "/v2/bookings",
            &self.version_bookings,
            None,
            Some(body),
        )
        .await
    }

    /// `GET /v2/bookings`, optionally filtered by attendee email or status.
    pub async fn list_bookings(&self, query: &Map<String, Value>) -> ApiResult<Value> {
        self.request(
            Method::GET,
            "/v2/bookings",
            &self.version_bookings,
            Some(query),
            None,
        )
        .await
    }

    /// `POST /v2/bookings/{uid}/cancel`.
    pub async fn cancel_booking(&self, booking_uid: &str, body: Option<&Value>) -> ApiResult<Value> {
        let path = format!("/v2/bookings/{}/cancel", booking_uid);
        self.request(
            Method::POST,
            &path,
            &self.version_bookings,
            None,
            body,
        )
        .await
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        version: &str,
        query: Option<&Map<String, Value>>,
        body: Option<&Value>,
    ) -> ApiResult<Value> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ApiError::missing_env("CAL_API_KEY"))?;

        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .http
            .request(method, &url)
            .bearer_auth(api_key)
            .header("cal-api-version", version);
        if let Some(query) = query {
            req = req.query(&query_pairs(query));
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let res = req.send().await?;
        let status = res.status();
        let text = res.text().await?;
        let data = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text))
        };

        if !status.is_success() {
            return Err(ApiError::Upstream {
                status: status.as_u16(),
                body: data,
            });
        }

        Ok(data)
    }
}

/// Flatten a JSON object into query pairs, skipping null and empty values
/// the way the provider expects.
fn query_pairs(query: &Map<String, Value>) -> Vec<(String, String)> {
    query
        .iter()
        .filter_map(|(key, value)| {
            let rendered = match value {
                Value::String(s) if s.is_empty() => return None,
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.clone(), rendered))
        })
        .collect()
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
    fn query_pairs_skips_null_and_empty_values() {
        let query = as_map(json!({
            "eventTypeId": 12,
            "timeZone": "UTC",
            "skipMe": null,
            "alsoSkip": "",
            "flag": true,
        }));

        let mut pairs = query_pairs(&query);
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("eventTypeId".to_string(), "12".to_string()),
                ("flag".to_string(), "true".to_string()),
                ("timeZone".to_string(), "UTC".to_string()),
            ]
        );
    }

    #[test]
    fn query_pairs_ignores_nested_structures() {
        let query = as_map(json!({"attendee": {"name": "Ana"}, "start": "2025-01-10"}));
        let pairs = query_pairs(&query);
        assert_eq!(pairs, vec![("start".to_string(), "2025-01-10".to_string())]);
    }
}
