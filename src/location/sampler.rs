use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use super::{LocationService, WatchOptions};
use crate::config::SamplerSettings;
use crate::error::{AlertError, PositionError};
use crate::models::position::{best_of, PositionSample};

/// Acquires one best-effort fix: the first sample at or under the accuracy threshold,
/// otherwise the best of what arrived before the sample budget or deadline ran out.
#[derive(Debug, Clone)]
pub struct PositionSampler {
    settings: SamplerSettings,
}

/// Why the continuous watch stopped without a sub-threshold sample.
#[derive(Debug)]
enum WatchEnd {
    BudgetExhausted,
    Deadline,
    Failed(PositionError),
}

impl PositionSampler {
    pub fn new(settings: SamplerSettings) -> Self {
        Self { settings }
    }

    /// Settles within `max_time + per_sample_timeout` whatever the platform does.
    pub async fn acquire<L: LocationService>(
        &self,
        location: &L,
    ) -> Result<PositionSample, AlertError> {
        if !location.is_available() {
            warn!("No location capability on this device");
            return Err(AlertError::LocationUnavailable);
        }

        let options = WatchOptions {
            high_accuracy: true,
            timeout: self.settings.per_sample_timeout,
        };
        let deadline = Instant::now() + self.settings.max_time;
        let mut samples: Vec<PositionSample> = Vec::with_capacity(self.settings.max_samples);

        let end = match location.watch_position(&options) {
            Ok(mut watch) => loop {
                match timeout_at(deadline, watch.next()).await {
                    Ok(Some(Ok(sample))) => {
                        if !sample.is_usable() {
                            debug!(?sample, "Discarding unusable sample");
                            continue;
                        }
                        if sample.accuracy_radius_meters <= self.settings.accuracy_threshold_m {
                            info!(
                                accuracy_m = sample.accuracy_radius_meters,
                                samples = samples.len() + 1,
                                "Accurate fix acquired"
                            );
                            return Ok(sample);
                        }
                        debug!(accuracy_m = sample.accuracy_radius_meters, "Buffered sample");
                        samples.push(sample);
                        if samples.len() >= self.settings.max_samples {
                            break WatchEnd::BudgetExhausted;
                        }
                    }
                    Ok(Some(Err(e))) => break WatchEnd::Failed(e),
                    Ok(None) => {
                        break WatchEnd::Failed(PositionError::PositionUnavailable(
                            "location feed closed".to_string(),
                        ))
                    }
                    Err(_) => break WatchEnd::Deadline,
                }
            },
            Err(e) => WatchEnd::Failed(e),
        };

        if let Some(best) = best_of(&samples) {
            info!(
                accuracy_m = best.accuracy_radius_meters,
                samples = samples.len(),
                reason = ?end,
                "Using best buffered fix"
            );
            return Ok(best);
        }

        warn!(reason = ?end, "Continuous location produced nothing, trying a one-shot fix");
        let one_shot = timeout(
            self.settings.per_sample_timeout,
            location.current_position(&options),
        )
        .await;

        match one_shot {
            Ok(Ok(sample)) if sample.is_usable() => {
                info!(accuracy_m = sample.accuracy_radius_meters, "One-shot fix acquired");
                Ok(sample)
            }
            Ok(Ok(sample)) => Err(AlertError::LocationAcquisitionFailed(format!(
                "one-shot fix unusable (accuracy {} m)",
                sample.accuracy_radius_meters
            ))),
            Ok(Err(e)) => Err(AlertError::LocationAcquisitionFailed(format!(
                "continuous: {end:?}; one-shot: {e}"
            ))),
            Err(_) => Err(AlertError::LocationAcquisitionFailed(format!(
                "continuous: {end:?}; one-shot: {}",
                PositionError::Timeout
            ))),
        }
    }
}
