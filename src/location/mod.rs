//! Platform location capability and the bounded sampler built on top of it.
//!
//! The platform side is callback-shaped (a continuous watch plus a one-shot request);
//! callers never see it directly and go through [`sampler::PositionSampler`] instead.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::PositionError;
use crate::models::position::PositionSample;

pub mod kafka;
pub mod sampler;

pub type Observation = Result<PositionSample, PositionError>;

#[derive(Debug, Clone, PartialEq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    /// Longest wait for any single observation before a `Timeout` is reported.
    pub timeout: Duration,
}

/// Source of raw location observations.
pub trait LocationService: Send + Sync {
    /// False when the device exposes no location capability at all.
    fn is_available(&self) -> bool;

    /// Starts a continuous subscription. The subscription lives exactly as long as the
    /// returned handle.
    fn watch_position(&self, options: &WatchOptions) -> Result<PositionWatch, PositionError>;

    /// A single observation.
    fn current_position(
        &self,
        options: &WatchOptions,
    ) -> impl Future<Output = Observation> + Send;
}

/// Live subscription to the platform location feed. Dropping it unsubscribes.
pub struct PositionWatch {
    rx: mpsc::Receiver<Observation>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl PositionWatch {
    pub fn new(rx: mpsc::Receiver<Observation>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            rx,
            release: Some(Box::new(release)),
        }
    }

    /// Next observation, or `None` once the platform side has gone away.
    pub async fn next(&mut self) -> Option<Observation> {
        self.rx.recv().await
    }
}

impl Drop for PositionWatch {
    fn drop(&mut self) {
        self.rx.close();
        if let Some(release) = self.release.take() {
            release();
        }
    }
}
