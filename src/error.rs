use thiserror::Error;

/// Failure reported by the platform location service for a single observation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PositionError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable: {0}")]
    PositionUnavailable(String),

    #[error("timed out waiting for a position")]
    Timeout,
}

/// Transport-level failure talking to the Backend Alert Service.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// Errors surfaced by the alert trigger to whoever displays it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlertError {
    #[error("this device has no location capability")]
    LocationUnavailable,

    #[error("could not acquire a location fix: {0}")]
    LocationAcquisitionFailed(String),

    #[error("alert could not be created: {0}")]
    AlertCreationFailed(String),

    #[error("staff notification failed: {0}")]
    NotificationDeliveryFailed(String),

    #[error("alert could not be resolved upstream: {0}")]
    AlertResolutionFailed(String),
}

impl AlertError {
    /// Fatal errors end the start path; the session goes back to idle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AlertError::LocationUnavailable
                | AlertError::LocationAcquisitionFailed(_)
                | AlertError::AlertCreationFailed(_)
        )
    }

    /// Blocking errors need an explicit notice before the user can carry on.
    pub fn is_blocking(&self) -> bool {
        matches!(self, AlertError::LocationUnavailable)
    }
}
