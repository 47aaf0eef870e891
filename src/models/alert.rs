use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::error::AlertError;

/// Lifecycle of one emergency alert as seen from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Idle,
    Sampling,
    Submitting,
    Active,
    Finalizing,
    Terminal,
}

impl AlertState {
    /// A session in flight blocks any new start.
    pub fn is_in_flight(self) -> bool {
        !matches!(self, AlertState::Idle | AlertState::Terminal)
    }
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertState::Idle => "idle",
            AlertState::Sampling => "sampling",
            AlertState::Submitting => "submitting",
            AlertState::Active => "active",
            AlertState::Finalizing => "finalizing",
            AlertState::Terminal => "terminal",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Cancelled,
    Resolved,
}

impl Classification {
    pub fn from_elapsed(elapsed_ms: u64, cancel_window: Duration) -> Self {
        if u128::from(elapsed_ms) < cancel_window.as_millis() {
            Classification::Cancelled
        } else {
            Classification::Resolved
        }
    }
}

/// Where a timestamp or duration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElapsedSource {
    Backend,
    Local,
}

/// An alert that reached the active state.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveAlert {
    pub alert_id: String,
    pub started_at: DateTime<Utc>,
    pub start_source: ElapsedSource,
    pub notification_error: Option<AlertError>,
}

/// Terminal classification of a finalized session. Shown once, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertOutcome {
    pub alert_id: String,
    pub elapsed_ms: u64,
    pub classification: Classification,
    pub source: ElapsedSource,
    pub resolution_error: Option<AlertError>,
}

/// What a single press of the trigger ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    Started(ActiveAlert),
    Finalized(AlertOutcome),
    /// Another session was mid-flight; the press was dropped.
    Ignored(AlertState),
}
