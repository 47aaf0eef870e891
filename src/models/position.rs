use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One location observation. Samples are only ever ranked by accuracy radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_radius_meters: f64,
    pub captured_at_epoch_ms: i64,
}

impl PositionSample {
    /// Usable samples carry a finite, non-negative accuracy radius and finite coordinates.
    pub fn is_usable(&self) -> bool {
        self.accuracy_radius_meters.is_finite()
            && self.accuracy_radius_meters >= 0.0
            && self.latitude.is_finite()
            && self.longitude.is_finite()
    }

    /// Smaller radius first; equal radii fall back to the earlier capture.
    pub fn rank(&self, other: &Self) -> Ordering {
        self.accuracy_radius_meters
            .total_cmp(&other.accuracy_radius_meters)
            .then(self.captured_at_epoch_ms.cmp(&other.captured_at_epoch_ms))
    }
}

/// The best sample of a buffer, if any.
pub fn best_of(samples: &[PositionSample]) -> Option<PositionSample> {
    samples.iter().copied().min_by(|a, b| a.rank(b))
}
