use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::message::Message;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::{LocationService, Observation, PositionWatch, WatchOptions};
use crate::config::AppConfig;
use crate::error::PositionError;
use crate::models::message::GpsMessage;
use crate::models::position::PositionSample;

/// Location capability backed by the tracking unit's telemetry topic.
///
/// Every subscription gets its own consumer group starting at the latest offset, so a
/// watch only ever sees fixes published after it was opened.
pub struct KafkaLocationService {
    bootstrap_servers: String,
    topic: String,
    group_id: String,
    sasl_mechanism: String,
    username: String,
    password: String,
    security_protocol: String,
    max_retries: u32,
    filter: FixFilter,
}

/// Keeps only fixes from one device and turns them into samples.
#[derive(Debug, Clone)]
struct FixFilter {
    device_id: String,
    uere_meters: f64,
}

impl FixFilter {
    fn parse(&self, payload: &[u8]) -> Option<PositionSample> {
        let message: GpsMessage = match serde_json::from_slice(payload) {
            Ok(m) => m,
            Err(e) => {
                warn!("Failed to parse telemetry message: {}", e);
                return None;
            }
        };
        match message.get_device_id() {
            Some(id) if *id == self.device_id => {}
            other => {
                trace!(device_id = ?other, "Skipping fix from another device");
                return None;
            }
        }
        let sample = message.to_sample(self.uere_meters);
        if sample.is_none() {
            debug!(uuid = ?message.uuid, "Telemetry message carries no usable fix");
        }
        sample
    }
}

impl KafkaLocationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            bootstrap_servers: config.kafka_bootstrap_servers.clone(),
            topic: config.kafka_topic.clone(),
            group_id: config.kafka_group_id.clone(),
            sasl_mechanism: config.kafka_sasl_mechanism.clone(),
            username: config.kafka_username.clone(),
            password: config.kafka_password.clone(),
            security_protocol: config.kafka_security_protocol.clone(),
            max_retries: config.kafka_max_retries.max(1),
            filter: FixFilter {
                device_id: config.device_id.trim().to_string(),
                uere_meters: config.gps_uere_meters,
            },
        }
    }

    fn consumer(&self) -> KafkaResult<StreamConsumer> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("group.id", format!("{}-{}", self.group_id, Uuid::new_v4()))
            .set("auto.offset.reset", "latest")
            .set("enable.auto.commit", "false")
            // SASL Configuration
            .set("security.protocol", &self.security_protocol)
            .set("sasl.mechanism", &self.sasl_mechanism)
            .set("sasl.username", &self.username)
            .set("sasl.password", &self.password);

        let consumer: StreamConsumer = client_config.create()?;
        consumer.subscribe(&[self.topic.as_str()])?;
        Ok(consumer)
    }
}

impl LocationService for KafkaLocationService {
    fn is_available(&self) -> bool {
        !self.bootstrap_servers.trim().is_empty() && !self.filter.device_id.is_empty()
    }

    fn watch_position(&self, options: &WatchOptions) -> Result<PositionWatch, PositionError> {
        let consumer = self
            .consumer()
            .map_err(|e| PositionError::PositionUnavailable(e.to_string()))?;
        info!(
            topic = %self.topic,
            device_id = %self.filter.device_id,
            high_accuracy = options.high_accuracy,
            "Watching device fixes"
        );

        let (tx, rx) = mpsc::channel(16);
        let filter = self.filter.clone();
        let max_retries = self.max_retries;
        let per_sample_timeout = options.timeout;
        let handle = tokio::spawn(async move {
            forward_fixes(consumer, filter, max_retries, per_sample_timeout, tx).await;
        });

        let abort = handle.abort_handle();
        Ok(PositionWatch::new(rx, move || {
            abort.abort();
            debug!("Location watch released");
        }))
    }

    async fn current_position(&self, options: &WatchOptions) -> Observation {
        let consumer = self
            .consumer()
            .map_err(|e| PositionError::PositionUnavailable(e.to_string()))?;
        let mut consecutive_failures = 0;
        timeout(
            options.timeout,
            next_fix(&consumer, &self.filter, &mut consecutive_failures, self.max_retries),
        )
        .await
        .unwrap_or(Err(PositionError::Timeout))
    }
}

/// Raw telemetry payloads as they come off the broker.
trait FixSource: Send + Sync {
    fn recv_payload(&self) -> impl Future<Output = KafkaResult<Option<Vec<u8>>>> + Send;
}

impl FixSource for StreamConsumer {
    async fn recv_payload(&self) -> KafkaResult<Option<Vec<u8>>> {
        // Copy out so no borrowed message lives past this call.
        self.recv().await.map(|m| m.payload().map(<[u8]>::to_vec))
    }
}

/// Pushes fixes into the watch until the receiver goes away or the broker is given up on.
async fn forward_fixes<S: FixSource>(
    consumer: S,
    filter: FixFilter,
    max_retries: u32,
    per_sample_timeout: Duration,
    tx: mpsc::Sender<Observation>,
) {
    let mut consecutive_failures = 0;
    loop {
        let observation = timeout(
            per_sample_timeout,
            next_fix(&consumer, &filter, &mut consecutive_failures, max_retries),
        )
        .await
        .unwrap_or(Err(PositionError::Timeout));

        let gave_up = matches!(observation, Err(PositionError::PositionUnavailable(_)));
        if tx.send(observation).await.is_err() || gave_up {
            break;
        }
    }
}

async fn next_fix<S: FixSource>(
    consumer: &S,
    filter: &FixFilter,
    consecutive_failures: &mut u32,
    max_retries: u32,
) -> Observation {
    loop {
        match consumer.recv_payload().await {
            Ok(Some(payload)) => {
                *consecutive_failures = 0;
                if let Some(sample) = filter.parse(&payload) {
                    return Ok(sample);
                }
            }
            Ok(None) => {
                *consecutive_failures = 0;
                warn!("Received empty payload from Kafka");
            }
            Err(e) => {
                *consecutive_failures += 1;
                error!(
                    "Kafka error: {}. Consecutive failures ({} / {})",
                    e, consecutive_failures, max_retries
                );
                if *consecutive_failures >= max_retries {
                    return Err(PositionError::PositionUnavailable(format!(
                        "telemetry feed failing: {e}"
                    )));
                }
                // Small delay to prevent tight loop in case of minor network glitches
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }
}
