//! Scripted collaborators for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;

use crate::backend::AlertBackend;
use crate::clock::Clock;
use crate::error::{BackendError, PositionError};
use crate::location::{LocationService, Observation, PositionWatch, WatchOptions};
use crate::models::api::{CreateAlertRequest, CreatedAlert, NotificationAck, ResolvedAlert};
use crate::models::position::PositionSample;

pub fn sample(accuracy: f64, captured_at_epoch_ms: i64) -> PositionSample {
    PositionSample {
        latitude: 20.652494,
        longitude: -100.391404,
        accuracy_radius_meters: accuracy,
        captured_at_epoch_ms,
    }
}

#[derive(Debug, Clone)]
pub enum WatchPlan {
    Refuse(PositionError),
    /// Delivers each observation after its delay in ms, then either closes or stays silent.
    Emit {
        steps: Vec<(u64, Observation)>,
        hang: bool,
    },
}

impl WatchPlan {
    pub fn emit(steps: Vec<(u64, Observation)>) -> Self {
        WatchPlan::Emit { steps, hang: false }
    }

    pub fn emit_then_hang(steps: Vec<(u64, Observation)>) -> Self {
        WatchPlan::Emit { steps, hang: true }
    }
}

#[derive(Debug, Clone)]
pub enum OneShotPlan {
    Reply(u64, Observation),
    Hang,
}

pub struct ScriptedLocation {
    available: bool,
    watch: WatchPlan,
    one_shot: OneShotPlan,
    pub opened: AtomicUsize,
    pub released: Arc<AtomicUsize>,
    pub one_shot_calls: AtomicUsize,
}

impl ScriptedLocation {
    pub fn new(watch: WatchPlan, one_shot: OneShotPlan) -> Self {
        Self {
            available: true,
            watch,
            one_shot,
            opened: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
            one_shot_calls: AtomicUsize::new(0),
        }
    }

    /// Every watch immediately yields one fix of the given accuracy.
    pub fn fixed(accuracy: f64) -> Self {
        Self::new(
            WatchPlan::emit_then_hang(vec![(0, Ok(sample(accuracy, 1)))]),
            OneShotPlan::Hang,
        )
    }

    pub fn unavailable() -> Self {
        let mut location = Self::new(WatchPlan::emit(vec![]), OneShotPlan::Hang);
        location.available = false;
        location
    }
}

impl LocationService for ScriptedLocation {
    fn is_available(&self) -> bool {
        self.available
    }

    fn watch_position(&self, _options: &WatchOptions) -> Result<PositionWatch, PositionError> {
        let (steps, hang) = match &self.watch {
            WatchPlan::Refuse(e) => return Err(e.clone()),
            WatchPlan::Emit { steps, hang } => (steps.clone(), *hang),
        };
        self.opened.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(async move {
            for (delay_ms, observation) in steps {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                if tx.send(observation).await.is_err() {
                    return;
                }
            }
            if hang {
                let _keep_open = tx;
                std::future::pending::<()>().await;
            }
        });

        let released = self.released.clone();
        Ok(PositionWatch::new(rx, move || {
            handle.abort();
            released.fetch_add(1, Ordering::SeqCst);
        }))
    }

    async fn current_position(&self, _options: &WatchOptions) -> Observation {
        self.one_shot_calls.fetch_add(1, Ordering::SeqCst);
        match self.one_shot.clone() {
            OneShotPlan::Reply(delay_ms, observation) => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                observation
            }
            OneShotPlan::Hang => std::future::pending().await,
        }
    }
}

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2025, 11, 29, 6, 15, 15).unwrap()),
        }
    }

    pub fn advance_ms(&self, ms: i64) {
        *self.now.lock().unwrap() += chrono::Duration::milliseconds(ms);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(CreateAlertRequest),
    Notify(String),
    Resolve(String, u64),
}

#[derive(Debug, Clone)]
pub enum NotifyReply {
    Delivered,
    Unsuccessful(String),
    Error,
}

#[derive(Debug, Clone)]
pub enum ResolveReply {
    Echo,
    Fixed(u64),
    NoDuration,
    Error,
    Hang,
}

/// Records every call; the create reply stamps `createdAt` from the shared clock after
/// advancing it by `create_latency_ms`.
pub struct FakeBackend {
    clock: Arc<ManualClock>,
    pub create_latency_ms: i64,
    pub omit_created_at: bool,
    pub failing_creates: AtomicUsize,
    pub notify: Mutex<NotifyReply>,
    pub resolve: Mutex<ResolveReply>,
    calls: Mutex<Vec<Call>>,
    next_id: AtomicUsize,
}

impl FakeBackend {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            create_latency_ms: 0,
            omit_created_at: false,
            failing_creates: AtomicUsize::new(0),
            notify: Mutex::new(NotifyReply::Delivered),
            resolve: Mutex::new(ResolveReply::Echo),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn creates(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Create(_)))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn unavailable() -> BackendError {
        BackendError::Status {
            status: 503,
            body: "service unavailable".to_string(),
        }
    }
}

impl AlertBackend for FakeBackend {
    async fn create_alert(&self, request: &CreateAlertRequest) -> Result<CreatedAlert, BackendError> {
        self.record(Call::Create(request.clone()));
        tokio::task::yield_now().await;
        let fail = self
            .failing_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(Self::unavailable());
        }
        self.clock.advance_ms(self.create_latency_ms);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(CreatedAlert {
            alert_id: format!("A{id}"),
            created_at: (!self.omit_created_at).then(|| self.clock.now()),
        })
    }

    async fn trigger_notification(&self, alert_id: &str) -> Result<NotificationAck, BackendError> {
        self.record(Call::Notify(alert_id.to_string()));
        tokio::task::yield_now().await;
        let reply = self.notify.lock().unwrap().clone();
        match reply {
            NotifyReply::Delivered => Ok(NotificationAck {
                success: true,
                message: None,
            }),
            NotifyReply::Unsuccessful(message) => Ok(NotificationAck {
                success: false,
                message: Some(message),
            }),
            NotifyReply::Error => Err(Self::unavailable()),
        }
    }

    async fn resolve_alert(&self, alert_id: &str, duration_ms: u64) -> Result<ResolvedAlert, BackendError> {
        self.record(Call::Resolve(alert_id.to_string(), duration_ms));
        tokio::task::yield_now().await;
        let reply = self.resolve.lock().unwrap().clone();
        match reply {
            ResolveReply::Echo => Ok(ResolvedAlert {
                duration_ms: Some(duration_ms),
            }),
            ResolveReply::Fixed(ms) => Ok(ResolvedAlert {
                duration_ms: Some(ms),
            }),
            ResolveReply::NoDuration => Ok(ResolvedAlert::default()),
            ResolveReply::Error => Err(Self::unavailable()),
            ResolveReply::Hang => std::future::pending().await,
        }
    }
}
