use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::position::PositionSample;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAlertRequest {
    pub location: PositionSample,
    pub alert_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAlertResponse {
    #[serde(deserialize_with = "parse_id")]
    pub alert_id: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Creation result with the backend timestamp already parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedAlert {
    pub alert_id: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<CreateAlertResponse> for CreatedAlert {
    fn from(resp: CreateAlertResponse) -> Self {
        let created_at = resp.created_at.as_deref().and_then(parse_timestamp);
        if created_at.is_none() {
            tracing::debug!(
                alert_id = %resp.alert_id,
                raw = ?resp.created_at,
                "createdAt missing or unparseable"
            );
        }
        Self {
            alert_id: resp.alert_id,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NotificationAck {
    /// A 2xx reply without a flag counts as delivered.
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveAlertRequest {
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAlert {
    #[serde(default, deserialize_with = "parse_u64_option")]
    pub duration_ms: Option<u64>,
}

/// RFC 3339 first, then the naive formats the backend has been seen to emit (taken as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|t| t.and_utc())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Int(u64),
    Float(f64),
}

fn parse_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) if !s.trim().is_empty() => Ok(s),
        StringOrNumber::String(_) => Err(serde::de::Error::custom("empty alertId")),
        StringOrNumber::Int(n) => Ok(n.to_string()),
        StringOrNumber::Float(f) => Ok(f.to_string()),
    }
}

fn parse_u64_option<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v: Option<StringOrNumber> = Option::deserialize(deserializer)?;
    match v {
        Some(StringOrNumber::Int(n)) => Ok(Some(n)),
        Some(StringOrNumber::Float(f)) if f.is_finite() && f >= 0.0 => Ok(Some(f.round() as u64)),
        Some(StringOrNumber::Float(_)) => Ok(None),
        Some(StringOrNumber::String(s)) => {
            if s.trim().is_empty() {
                Ok(None)
            } else {
                s.trim().parse::<u64>().map(Some).map_err(serde::de::Error::custom)
            }
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_create_request_wire_shape() {
        let req = CreateAlertRequest {
            location: PositionSample {
                latitude: 20.5,
                longitude: -100.25,
                accuracy_radius_meters: 8.0,
                captured_at_epoch_ms: 1_764_396_915_000,
            },
            alert_type: "panic_button".to_string(),
            subject_id: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["alertType"], "panic_button");
        assert_eq!(json["location"]["accuracyRadiusMeters"], 8.0);
        assert_eq!(json["location"]["capturedAtEpochMs"], 1_764_396_915_000i64);
        assert!(json.get("subjectId").is_none());
    }

    #[test]
    fn test_create_response_numeric_id_and_timestamp() {
        let resp: CreateAlertResponse =
            serde_json::from_str(r#"{"alertId": 42, "createdAt": "2025-11-29T06:15:15.250Z"}"#)
                .unwrap();
        let created = CreatedAlert::from(resp);
        assert_eq!(created.alert_id, "42");
        assert_eq!(
            created.created_at,
            Some(Utc.with_ymd_and_hms(2025, 11, 29, 6, 15, 15).unwrap()
                + chrono::Duration::milliseconds(250))
        );
    }

    #[test]
    fn test_create_response_without_timestamp() {
        let resp: CreateAlertResponse = serde_json::from_str(r#"{"alertId": "A1"}"#).unwrap();
        let created = CreatedAlert::from(resp);
        assert_eq!(created.alert_id, "A1");
        assert!(created.created_at.is_none());

        let resp: CreateAlertResponse =
            serde_json::from_str(r#"{"alertId": "A1", "createdAt": "yesterday"}"#).unwrap();
        assert!(CreatedAlert::from(resp).created_at.is_none());
    }

    #[test]
    fn test_naive_timestamp_is_utc() {
        assert_eq!(
            parse_timestamp("2025-11-29 06:15:15"),
            Some(Utc.with_ymd_and_hms(2025, 11, 29, 6, 15, 15).unwrap())
        );
    }

    #[test]
    fn test_notification_ack_defaults() {
        let ack: NotificationAck = serde_json::from_str("{}").unwrap();
        assert!(ack.success);
        let ack: NotificationAck =
            serde_json::from_str(r#"{"success": false, "message": "no staff on shift"}"#).unwrap();
        assert!(!ack.success);
        assert_eq!(ack.message.as_deref(), Some("no staff on shift"));
    }

    #[test]
    fn test_resolved_duration_variants() {
        let r: ResolvedAlert = serde_json::from_str(r#"{"durationMs": 3200}"#).unwrap();
        assert_eq!(r.duration_ms, Some(3200));
        let r: ResolvedAlert = serde_json::from_str(r#"{"durationMs": "4100"}"#).unwrap();
        assert_eq!(r.duration_ms, Some(4100));
        let r: ResolvedAlert = serde_json::from_str(r#"{"durationMs": null}"#).unwrap();
        assert_eq!(r.duration_ms, None);
        let r: ResolvedAlert = serde_json::from_str(r#"{"status": "resolved"}"#).unwrap();
        assert_eq!(r.duration_ms, None);
    }
}
