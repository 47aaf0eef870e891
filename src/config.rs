use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub alert_api_url: String,
    pub alert_api_token: String,
    pub alert_api_timeout_secs: u64,
    pub alert_type: String,
    pub alert_subject_id: Option<String>,
    pub alert_cancel_window_ms: u64,
    pub countdown_tick_ms: u64,
    pub sampler_max_samples: usize,
    pub sampler_max_time_ms: u64,
    pub sampler_accuracy_threshold_m: f64,
    pub sampler_per_sample_timeout_ms: u64,
    pub kafka_bootstrap_servers: String,
    pub kafka_topic: String,
    pub kafka_group_id: String,
    pub kafka_sasl_mechanism: String,
    pub kafka_username: String,
    pub kafka_password: String,
    pub kafka_security_protocol: String,
    pub kafka_max_retries: u32,
    pub device_id: String,
    pub gps_uere_meters: f64,
    pub log_level: String,
}

/// Bounds for one location acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerSettings {
    pub max_samples: usize,
    pub max_time: Duration,
    pub accuracy_threshold_m: f64,
    pub per_sample_timeout: Duration,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            max_samples: 8,
            max_time: Duration::from_millis(10_000),
            accuracy_threshold_m: 20.0,
            per_sample_timeout: Duration::from_millis(5_000),
        }
    }
}

/// What the controller sends on create and how it times the cancel window.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertSettings {
    pub alert_type: String,
    pub subject_id: Option<String>,
    pub cancel_window: Duration,
    pub countdown_tick: Duration,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            alert_type: "panic_button".to_string(),
            subject_id: None,
            cancel_window: Duration::from_millis(5_000),
            countdown_tick: Duration::from_millis(100),
        }
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let alert_api_url = env::var("ALERT_API_URL")
            .unwrap_or_else(|_| "http://localhost:8000/api/v1".to_string())
            .trim_end_matches('/')
            .to_string();
        let alert_api_token = env::var("ALERT_API_TOKEN").unwrap_or_default();
        let alert_api_timeout_secs = parse_or("ALERT_API_TIMEOUT_SECS", 15);
        let alert_type = env::var("ALERT_TYPE").unwrap_or_else(|_| "panic_button".to_string());
        let alert_subject_id = env::var("ALERT_SUBJECT_ID")
            .ok()
            .filter(|s| !s.trim().is_empty());
        let alert_cancel_window_ms = parse_or("ALERT_CANCEL_WINDOW_MS", 5_000);
        let countdown_tick_ms = parse_or("COUNTDOWN_TICK_MS", 100);

        let sampler_max_samples = parse_or("SAMPLER_MAX_SAMPLES", 8);
        let sampler_max_time_ms = parse_or("SAMPLER_MAX_TIME_MS", 10_000);
        let sampler_accuracy_threshold_m = parse_or("SAMPLER_ACCURACY_THRESHOLD_M", 20.0);
        let sampler_per_sample_timeout_ms = parse_or("SAMPLER_PER_SAMPLE_TIMEOUT_MS", 5_000);

        let kafka_bootstrap_servers =
            env::var("KAFKA_BOOTSTRAP_SERVERS").unwrap_or_else(|_| "localhost:9092".to_string());
        let kafka_topic = env::var("KAFKA_TOPIC").unwrap_or_else(|_| "siscom-minimal".to_string());
        let kafka_group_id =
            env::var("KAFKA_GROUP_ID").unwrap_or_else(|_| "siscom-sos".to_string());
        let kafka_sasl_mechanism =
            env::var("KAFKA_SASL_MECHANISM").unwrap_or_else(|_| "SCRAM-SHA-256".to_string());
        let kafka_username = env::var("KAFKA_USERNAME").unwrap_or_default();
        let kafka_password = env::var("KAFKA_PASSWORD").unwrap_or_default();
        let kafka_security_protocol =
            env::var("KAFKA_SECURITY_PROTOCOL").unwrap_or_else(|_| "SASL_PLAINTEXT".to_string());
        let kafka_max_retries = parse_or("KAFKA_MAX_RETRIES", 5);

        let device_id = env::var("DEVICE_ID").unwrap_or_default();
        let gps_uere_meters = parse_or("GPS_UERE_METERS", 5.0);

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            alert_api_url,
            alert_api_token,
            alert_api_timeout_secs,
            alert_type,
            alert_subject_id,
            alert_cancel_window_ms,
            countdown_tick_ms,
            sampler_max_samples,
            sampler_max_time_ms,
            sampler_accuracy_threshold_m,
            sampler_per_sample_timeout_ms,
            kafka_bootstrap_servers,
            kafka_topic,
            kafka_group_id,
            kafka_sasl_mechanism,
            kafka_username,
            kafka_password,
            kafka_security_protocol,
            kafka_max_retries,
            device_id,
            gps_uere_meters,
            log_level,
        })
    }

    pub fn sampler_settings(&self) -> SamplerSettings {
        SamplerSettings {
            max_samples: self.sampler_max_samples.max(1),
            max_time: Duration::from_millis(self.sampler_max_time_ms),
            accuracy_threshold_m: self.sampler_accuracy_threshold_m,
            per_sample_timeout: Duration::from_millis(self.sampler_per_sample_timeout_ms),
        }
    }

    pub fn alert_settings(&self) -> AlertSettings {
        AlertSettings {
            alert_type: self.alert_type.clone(),
            subject_id: self.alert_subject_id.clone(),
            cancel_window: Duration::from_millis(self.alert_cancel_window_ms),
            // A zero period would make tokio::time::interval panic.
            countdown_tick: Duration::from_millis(self.countdown_tick_ms.max(1)),
        }
    }
}
