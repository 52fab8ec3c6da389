//! Adapter common utility functions
//!
//! HTTP status classification, body decoding and JSON field helpers shared
//! by the manufacturer adapters.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use contracts::FetchError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::trace;

/// Map a non-success HTTP status to the fetch error taxonomy
///
/// Returns `None` for 2xx.
pub fn classify_status(source_id: &str, status: StatusCode, headers: &HeaderMap) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }
    let err = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            FetchError::auth(source_id, status.as_u16())
        }
        StatusCode::TOO_MANY_REQUESTS => {
            FetchError::rate_limited(source_id, parse_retry_after(headers))
        }
        status => FetchError::unavailable(source_id, format!("upstream returned {status}")),
    };
    Some(err)
}

/// `Retry-After` in delta-seconds form
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Transport failures are always `UpstreamUnavailable`
pub fn map_transport_error(source_id: &str, err: reqwest::Error) -> FetchError {
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    };
    FetchError::unavailable(source_id, message)
}

/// Send a request and decode a JSON body, classifying failures
pub async fn send_json(source_id: &str, request: RequestBuilder) -> Result<Value, FetchError> {
    let response = request
        .send()
        .await
        .map_err(|e| map_transport_error(source_id, e))?;

    if let Some(err) = classify_status(source_id, response.status(), response.headers()) {
        return Err(err);
    }

    let body: Bytes = response
        .bytes()
        .await
        .map_err(|e| map_transport_error(source_id, e))?;
    trace!(source_id = %source_id, bytes = body.len(), "response body received");

    serde_json::from_slice(&body)
        .map_err(|e| FetchError::unavailable(source_id, format!("invalid response body: {e}")))
}

/// Numeric value, accepting numbers and numeric strings
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Identifier, accepting strings and integers
pub fn as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Timestamp, accepting RFC 3339 strings and unix seconds
pub fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc))
            .or_else(|| s.trim().parse::<i64>().ok().and_then(unix_seconds)),
        Value::Number(n) => n.as_i64().and_then(unix_seconds),
        _ => None,
    }
}

fn unix_seconds(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// Non-empty string field
pub fn as_text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_classify_status() {
        let headers = HeaderMap::new();
        assert!(classify_status("s", StatusCode::OK, &headers).is_none());
        assert_eq!(
            classify_status("s", StatusCode::FORBIDDEN, &headers),
            Some(FetchError::auth("s", 403))
        );
        assert!(matches!(
            classify_status("s", StatusCode::BAD_GATEWAY, &headers),
            Some(FetchError::UpstreamUnavailable { .. })
        ));
        // 4xx other than auth/429 is treated as transient as well
        assert!(matches!(
            classify_status("s", StatusCode::NOT_FOUND, &headers),
            Some(FetchError::UpstreamUnavailable { .. })
        ));
    }

    #[test]
    fn test_rate_limit_carries_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(
            classify_status("s", StatusCode::TOO_MANY_REQUESTS, &headers),
            Some(FetchError::rate_limited("s", Some(Duration::from_secs(7))))
        );
    }

    #[test]
    fn test_json_helpers() {
        assert_eq!(as_f64(&json!(12.5)), Some(12.5));
        assert_eq!(as_f64(&json!("3.0")), Some(3.0));
        assert_eq!(as_f64(&json!(null)), None);
        assert_eq!(as_id(&json!(1234)), Some("1234".to_string()));
        assert_eq!(as_id(&json!("  ")), None);

        let ts = as_timestamp(&json!("2024-05-01T12:00:00Z")).unwrap();
        assert_eq!(ts.timestamp(), 1_714_564_800);
        assert_eq!(as_timestamp(&json!(1_714_564_800)), Some(ts));
        assert_eq!(as_timestamp(&json!("yesterday")), None);
    }
}
