//! KOReader sync protocol wire types
//!
//! The client is strict about the media type and lenient about nearly
//! everything else: field types drift between client versions, so request
//! values are accepted as strings or numbers and normalised here.

use axum::{
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

use crate::db::ProgressRecord;

/// Media type of every sync protocol response
pub const KOREADER_CONTENT_TYPE: &str = "application/vnd.koreader.v1+json; charset=utf-8";

/// JSON response carrying the KOReader media type
#[derive(Debug, Clone)]
pub struct KoJson<T>(pub T);

impl<T: Serialize> IntoResponse for KoJson<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(body) => {
                let mut response = body.into_response();
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static(KOREADER_CONTENT_TYPE),
                );
                response
            }
            Err(e) => crate::error::ApiError::internal(format!("Failed to encode response: {e}"))
                .into_response(),
        }
    }
}

/// `GET /users/auth` response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthorizedResponse {
    #[schema(example = "OK")]
    pub authorized: String,
}

/// `GET /healthcheck` response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthcheckResponse {
    #[schema(example = "OK")]
    pub state: String,
}

/// `PUT /syncs/progress` request body
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateProgressRequest {
    /// Document fingerprint as computed by the client
    #[serde(default)]
    #[schema(example = "0b229176d4e8db7f6d2b5a4952368d7a")]
    pub document: Option<String>,

    /// Opaque reading position (xpointer or page number)
    #[serde(default, deserialize_with = "lenient_string")]
    #[schema(value_type = Option<String>, example = "/body/DocFragment[20]/body/p[22]/text().0")]
    pub progress: Option<String>,

    /// Fraction read, in `[0, 1]`
    #[serde(default, deserialize_with = "lenient_f64")]
    #[schema(value_type = Option<f64>, example = 0.3277)]
    pub percentage: Option<f64>,

    #[serde(default, deserialize_with = "lenient_string")]
    #[schema(value_type = Option<String>, example = "Kobo Libra 2")]
    pub device: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    #[schema(value_type = Option<String>, example = "4AC3F6E1B5E84DA2")]
    pub device_id: Option<String>,
}

/// `PUT /syncs/progress` response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateProgressResponse {
    pub document: String,
    /// Unix seconds of the stored update
    #[schema(example = 1_760_000_000)]
    pub timestamp: i64,
}

/// `GET /syncs/progress/{document}` response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProgressResponse {
    pub document: String,
    pub progress: String,
    /// Percentage read, scaled to `[0, 100]`
    #[schema(example = "32.77")]
    pub percentage: String,
    pub device: String,
    pub device_id: String,
    /// Unix seconds of the last update
    pub timestamp: i64,
}

impl From<ProgressRecord> for ProgressResponse {
    fn from(record: ProgressRecord) -> Self {
        Self {
            percentage: record
                .percent()
                .map(format_percent)
                .unwrap_or_else(|| "0.0".to_string()),
            document: record.fingerprint.into_inner(),
            progress: record.progress.unwrap_or_default(),
            device: record.device.unwrap_or_default(),
            device_id: record.device_id.unwrap_or_default(),
            timestamp: record.updated_at.timestamp(),
        }
    }
}

/// Render a percentage without float noise, keeping at least one decimal
pub fn format_percent(value: f64) -> String {
    let rounded = (value * 1e10).round() / 1e10;
    if rounded.fract() == 0.0 {
        format!("{rounded:.1}")
    } else {
        rounded.to_string()
    }
}

/// A string field that some clients send as a number
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// A number field that some clients send as a string. Unparseable values are dropped.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|p: &f64| p.is_finite()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use kosync_core::Fingerprint;

    #[test]
    fn test_lenient_request_parsing() {
        let body = r#"{"document":"abc","progress":42,"percentage":"0.5","device":"kobo"}"#;
        let req: UpdateProgressRequest = serde_json::from_str(body).unwrap();

        assert_eq!(req.document.as_deref(), Some("abc"));
        assert_eq!(req.progress.as_deref(), Some("42"));
        assert_eq!(req.percentage, Some(0.5));
        assert_eq!(req.device.as_deref(), Some("kobo"));
        assert_eq!(req.device_id, None);
    }

    #[test]
    fn test_garbage_percentage_is_dropped() {
        let req: UpdateProgressRequest =
            serde_json::from_str(r#"{"document":"abc","percentage":"lots"}"#).unwrap();
        assert_eq!(req.percentage, None);
    }

    #[test]
    fn test_non_finite_percentage_is_dropped() {
        for value in ["NaN", "inf", "-infinity"] {
            let body = format!(r#"{{"document":"abc","percentage":"{value}"}}"#);
            let req: UpdateProgressRequest = serde_json::from_str(&body).unwrap();
            assert_eq!(req.percentage, None, "{value}");
        }

        let req: UpdateProgressRequest =
            serde_json::from_str(r#"{"document":"abc","percentage":0.75}"#).unwrap();
        assert_eq!(req.percentage, Some(0.75));
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(25.0), "25.0");
        assert_eq!(format_percent(0.0), "0.0");
        assert_eq!(format_percent(0.123 * 100.0), "12.3");
        assert_eq!(format_percent(32.77), "32.77");
    }

    #[test]
    fn test_progress_response_defaults() {
        let record = ProgressRecord {
            owner: 1,
            fingerprint: Fingerprint::from_client("abc"),
            progress: None,
            percentage: None,
            device: None,
            device_id: None,
            updated_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        };
        let response = ProgressResponse::from(record);

        assert_eq!(response.document, "abc");
        assert_eq!(response.progress, "");
        assert_eq!(response.percentage, "0.0");
        assert_eq!(response.device, "");
        assert_eq!(response.device_id, "");
        assert_eq!(response.timestamp, 1_700_000_000);
    }
}
