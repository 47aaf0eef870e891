use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::{elapsed_ms, Clock};

/// Remaining cancel-window time at `now`. Display only; never used to classify.
pub fn remaining_ms(cancel_window: Duration, started_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let window = u64::try_from(cancel_window.as_millis()).unwrap_or(u64::MAX);
    window.saturating_sub(elapsed_ms(started_at, now))
}

/// Periodically republishes the remaining cancel-window time while an alert is active.
/// The ticking task dies with this value.
pub struct Countdown {
    remaining: watch::Receiver<u64>,
    handle: JoinHandle<()>,
}

impl Countdown {
    pub fn start(
        clock: Arc<dyn Clock>,
        started_at: DateTime<Utc>,
        cancel_window: Duration,
        tick: Duration,
    ) -> Self {
        let (tx, remaining) =
            watch::channel(remaining_ms(cancel_window, started_at, clock.now()));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let value = remaining_ms(cancel_window, started_at, clock.now());
                tx.send_if_modified(|current| {
                    let changed = *current != value;
                    *current = value;
                    changed
                });
            }
        });

        Self { remaining, handle }
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.remaining.clone()
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
