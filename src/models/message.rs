use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::position::PositionSample;

/// A telemetry message published by the tracking unit.
#[derive(Debug, Deserialize)]
pub struct GpsMessage {
    pub data: Data,
    pub metadata: Metadata,
    #[serde(default)]
    pub uuid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Data {
    #[serde(rename = "GPS_DATETIME")]
    pub gps_datetime: Option<String>,
    #[serde(rename = "GPS_EPOCH", default, deserialize_with = "parse_f64_option")]
    pub gps_epoch: Option<f64>,
    #[serde(rename = "LATITUD", default, deserialize_with = "parse_f64_option")]
    pub latitude: Option<f64>,
    #[serde(rename = "LONGITUD", default, deserialize_with = "parse_f64_option")]
    pub longitude: Option<f64>,
    #[serde(rename = "HDOP", default, deserialize_with = "parse_f64_option")]
    pub hdop: Option<f64>,
    #[serde(rename = "ACCURACY", default, deserialize_with = "parse_f64_option")]
    pub accuracy: Option<f64>,
    #[serde(rename = "FIX_", default, deserialize_with = "parse_f64_option")]
    pub fix: Option<f64>,
    #[serde(rename = "DEVICE_ID")]
    pub device_id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Metadata {
    #[serde(rename = "DEVICE_ID")]
    pub device_id: Option<String>,
    #[serde(rename = "RECEIVED_EPOCH", default)]
    pub received_epoch_ms: Option<i64>,
    #[serde(flatten)]
    pub other: HashMap<String, Value>,
}

impl GpsMessage {
    pub fn get_device_id(&self) -> Option<&String> {
        self.data.device_id.as_ref().or(self.metadata.device_id.as_ref())
    }

    /// Observation time in epoch ms: GPS epoch, then GPS datetime, then broker receive time.
    pub fn captured_at_epoch_ms(&self) -> Option<i64> {
        if let Some(epoch) = self.data.gps_epoch.filter(|e| *e > 0.0) {
            return Some((epoch * 1000.0) as i64);
        }
        let from_datetime = self.data.gps_datetime.as_deref().and_then(|raw| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
                .ok()
        });
        from_datetime
            .map(|t| t.and_utc().timestamp_millis())
            .or(self.metadata.received_epoch_ms)
    }

    /// Converts the message into a position sample. Messages without a fix, coordinates,
    /// timestamp, or any accuracy estimate yield `None`.
    pub fn to_sample(&self, uere_meters: f64) -> Option<PositionSample> {
        if self.data.fix == Some(0.0) {
            return None;
        }
        let accuracy = self
            .data
            .accuracy
            .or_else(|| self.data.hdop.map(|hdop| hdop * uere_meters))?;
        let sample = PositionSample {
            latitude: self.data.latitude?,
            longitude: self.data.longitude?,
            accuracy_radius_meters: accuracy,
            captured_at_epoch_ms: self.captured_at_epoch_ms()?,
        };
        sample.is_usable().then_some(sample)
    }
}

fn parse_f64_option<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrFloat {
        String(String),
        Float(f64),
    }

    let v: Option<StringOrFloat> = Option::deserialize(deserializer)?;
    match v {
        Some(StringOrFloat::Float(f)) => Ok(Some(f)),
        Some(StringOrFloat::String(s)) => {
            if s.trim().is_empty() {
                Ok(None)
            } else {
                s.trim().parse::<f64>().map(Some).map_err(serde::de::Error::custom)
            }
        }
        None => Ok(None),
    }
}
