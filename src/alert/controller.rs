//! Drives one emergency alert at a time through its lifecycle.
//!
//! ```text
//!  Idle ──trigger──► Sampling ──fix──► Submitting ──created──► Active
//!   ▲                   │                  │                     │ trigger
//!   │        failure    │     failure      │                     ▼
//!   ├───────────────────┴──────────────────┘                 Finalizing
//!   │                                                            │ resolved / failed
//!   └─────────────────────── dismiss ─────────────── Terminal ◄──┘
//! ```
//!
//! Every press goes through [`AlertController::trigger`]. The decision of what the press
//! means and the resulting state write happen under one lock, before the first `.await`,
//! so two presses can never both start a session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::countdown::Countdown;
use crate::backend::AlertBackend;
use crate::clock::{elapsed_ms, Clock};
use crate::config::AlertSettings;
use crate::error::AlertError;
use crate::location::sampler::PositionSampler;
use crate::location::LocationService;
use crate::models::alert::{
    ActiveAlert, AlertOutcome, AlertState, Classification, ElapsedSource, TriggerOutcome,
};
use crate::models::api::CreateAlertRequest;

enum Session {
    Idle,
    Sampling,
    Submitting,
    Active {
        alert_id: String,
        started_at: DateTime<Utc>,
        countdown: Countdown,
    },
    Finalizing,
    Terminal(AlertOutcome),
}

impl Session {
    fn state(&self) -> AlertState {
        match self {
            Session::Idle => AlertState::Idle,
            Session::Sampling => AlertState::Sampling,
            Session::Submitting => AlertState::Submitting,
            Session::Active { .. } => AlertState::Active,
            Session::Finalizing => AlertState::Finalizing,
            Session::Terminal(_) => AlertState::Terminal,
        }
    }
}

/// What a press was claimed as, decided synchronously.
enum Claim {
    Start,
    Finalize {
        alert_id: String,
        started_at: DateTime<Utc>,
    },
    Busy(AlertState),
}

pub struct AlertController<B, L> {
    backend: B,
    location: L,
    sampler: PositionSampler,
    clock: Arc<dyn Clock>,
    settings: AlertSettings,
    session: Mutex<Session>,
    state_tx: watch::Sender<AlertState>,
}

impl<B: AlertBackend, L: LocationService> AlertController<B, L> {
    pub fn new(
        backend: B,
        location: L,
        sampler: PositionSampler,
        clock: Arc<dyn Clock>,
        settings: AlertSettings,
    ) -> Self {
        let (state_tx, _) = watch::channel(AlertState::Idle);
        Self {
            backend,
            location,
            sampler,
            clock,
            settings,
            session: Mutex::new(Session::Idle),
            state_tx,
        }
    }

    pub fn state(&self) -> AlertState {
        self.lock().state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<AlertState> {
        self.state_tx.subscribe()
    }

    /// Remaining cancel-window time, published only while the alert is active.
    pub fn countdown(&self) -> Option<watch::Receiver<u64>> {
        match &*self.lock() {
            Session::Active { countdown, .. } => Some(countdown.subscribe()),
            _ => None,
        }
    }

    /// Starts an alert when none is in flight, finalizes the active one otherwise.
    /// Presses that land while a session is sampling, submitting or finalizing are ignored.
    ///
    /// Dropping the returned future mid-flight does not strand the session: sampling and
    /// submitting revert to idle, finalizing settles on a local classification.
    pub async fn trigger(&self) -> Result<TriggerOutcome, AlertError> {
        match self.claim() {
            Claim::Start => {
                let mut pending = Pending::new(self, None);
                let result = self.start().await;
                pending.disarm();
                result.map(TriggerOutcome::Started)
            }
            Claim::Finalize {
                alert_id,
                started_at,
            } => {
                let mut pending = Pending::new(self, Some((alert_id.clone(), started_at)));
                let outcome = self.finalize(alert_id, started_at).await;
                pending.disarm();
                Ok(TriggerOutcome::Finalized(outcome))
            }
            Claim::Busy(state) => {
                debug!(%state, "Trigger ignored, session in flight");
                Ok(TriggerOutcome::Ignored(state))
            }
        }
    }

    /// Clears a displayed outcome and returns to idle.
    pub fn dismiss(&self) -> Option<AlertOutcome> {
        let mut session = self.lock();
        match std::mem::replace(&mut *session, Session::Idle) {
            Session::Terminal(outcome) => {
                self.publish(AlertState::Idle);
                Some(outcome)
            }
            other => {
                *session = other;
                None
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: AlertState) {
        debug!(%state, "Alert state");
        self.state_tx.send_replace(state);
    }

    fn transition(&self, next: Session) {
        let state = next.state();
        let mut session = self.lock();
        *session = next;
        self.publish(state);
    }

    fn classify(
        &self,
        alert_id: String,
        elapsed_ms: u64,
        source: ElapsedSource,
        resolution_error: Option<AlertError>,
    ) -> AlertOutcome {
        AlertOutcome {
            alert_id,
            elapsed_ms,
            classification: Classification::from_elapsed(elapsed_ms, self.settings.cancel_window),
            source,
            resolution_error,
        }
    }

    /// Settles a session whose `trigger` future was dropped before it finished.
    fn abandon(&self, finalizing: Option<(String, DateTime<Utc>)>) {
        let mut session = self.lock();
        let next = match (&*session, finalizing) {
            (Session::Sampling | Session::Submitting, _) => {
                warn!(state = %session.state(), "Alert start abandoned, back to idle");
                Session::Idle
            }
            (Session::Finalizing, Some((alert_id, started_at))) => {
                let local_elapsed_ms = elapsed_ms(started_at, self.clock.now());
                warn!(%alert_id, "Finalize abandoned before resolve completed, classifying locally");
                Session::Terminal(self.classify(
                    alert_id,
                    local_elapsed_ms,
                    ElapsedSource::Local,
                    Some(AlertError::AlertResolutionFailed(
                        "resolve abandoned before completion".to_string(),
                    )),
                ))
            }
            _ => return,
        };
        let state = next.state();
        *session = next;
        self.publish(state);
    }

    fn claim(&self) -> Claim {
        let mut session = self.lock();
        let (next, claim) = match std::mem::replace(&mut *session, Session::Idle) {
            Session::Idle | Session::Terminal(_) => (Session::Sampling, Claim::Start),
            Session::Active {
                alert_id,
                started_at,
                countdown,
            } => {
                // Countdown stops the moment the session leaves Active.
                drop(countdown);
                (
                    Session::Finalizing,
                    Claim::Finalize {
                        alert_id,
                        started_at,
                    },
                )
            }
            busy => {
                let state = busy.state();
                (busy, Claim::Busy(state))
            }
        };
        let state = next.state();
        *session = next;
        if !matches!(claim, Claim::Busy(_)) {
            self.publish(state);
        }
        claim
    }

    async fn start(&self) -> Result<ActiveAlert, AlertError> {
        let sample = match self.sampler.acquire(&self.location).await {
            Ok(sample) => sample,
            Err(e) => {
                error!(error = %e, "Alert not started, no location");
                self.transition(Session::Idle);
                return Err(e);
            }
        };

        self.transition(Session::Submitting);
        let request = CreateAlertRequest {
            location: sample,
            alert_type: self.settings.alert_type.clone(),
            subject_id: self.settings.subject_id.clone(),
        };
        let submitted_at = self.clock.now();
        let created = match self.backend.create_alert(&request).await {
            Ok(created) => created,
            Err(e) => {
                error!(error = %e, "Alert creation failed");
                self.transition(Session::Idle);
                return Err(AlertError::AlertCreationFailed(e.to_string()));
            }
        };

        let (started_at, start_source) = match created.created_at {
            Some(at) => (at, ElapsedSource::Backend),
            None => {
                warn!(alert_id = %created.alert_id, "Backend omitted createdAt, timing from local submit");
                (submitted_at, ElapsedSource::Local)
            }
        };
        info!(
            alert_id = %created.alert_id,
            accuracy_m = sample.accuracy_radius_meters,
            %started_at,
            "Alert created"
        );

        let notification_error = match self.backend.trigger_notification(&created.alert_id).await {
            Ok(ack) if ack.success => {
                info!(alert_id = %created.alert_id, "Notification dispatched");
                None
            }
            Ok(ack) => Some(AlertError::NotificationDeliveryFailed(
                ack.message
                    .unwrap_or_else(|| "backend reported failure".to_string()),
            )),
            Err(e) => Some(AlertError::NotificationDeliveryFailed(e.to_string())),
        };
        if let Some(e) = &notification_error {
            warn!(alert_id = %created.alert_id, error = %e, "Alert active without notification");
        }

        let countdown = Countdown::start(
            self.clock.clone(),
            started_at,
            self.settings.cancel_window,
            self.settings.countdown_tick,
        );
        self.transition(Session::Active {
            alert_id: created.alert_id.clone(),
            started_at,
            countdown,
        });

        Ok(ActiveAlert {
            alert_id: created.alert_id,
            started_at,
            start_source,
            notification_error,
        })
    }

    async fn finalize(&self, alert_id: String, started_at: DateTime<Utc>) -> AlertOutcome {
        let local_elapsed_ms = elapsed_ms(started_at, self.clock.now());

        let (elapsed_ms, source, resolution_error) =
            match self.backend.resolve_alert(&alert_id, local_elapsed_ms).await {
                Ok(resolved) => match resolved.duration_ms {
                    Some(ms) => (ms, ElapsedSource::Backend, None),
                    None => (local_elapsed_ms, ElapsedSource::Local, None),
                },
                Err(e) => {
                    // The alert stays open upstream; the user still gets a local classification.
                    warn!(%alert_id, error = %e, "Resolve failed, classifying locally");
                    (
                        local_elapsed_ms,
                        ElapsedSource::Local,
                        Some(AlertError::AlertResolutionFailed(e.to_string())),
                    )
                }
            };

        let outcome = self.classify(alert_id, elapsed_ms, source, resolution_error);
        info!(
            alert_id = %outcome.alert_id,
            elapsed_ms = outcome.elapsed_ms,
            local_elapsed_ms,
            classification = ?outcome.classification,
            "Alert finalized"
        );
        self.transition(Session::Terminal(outcome.clone()));
        outcome
    }
}

/// Armed while a claimed press is awaiting; settles the session if the press is dropped.
struct Pending<'a, B: AlertBackend, L: LocationService> {
    controller: &'a AlertController<B, L>,
    finalizing: Option<(String, DateTime<Utc>)>,
    armed: bool,
}

impl<'a, B: AlertBackend, L: LocationService> Pending<'a, B, L> {
    fn new(
        controller: &'a AlertController<B, L>,
        finalizing: Option<(String, DateTime<Utc>)>,
    ) -> Self {
        Self {
            controller,
            finalizing,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<B: AlertBackend, L: LocationService> Drop for Pending<'_, B, L> {
    fn drop(&mut self) {
        if self.armed {
            self.controller.abandon(self.finalizing.take());
        }
    }
}
