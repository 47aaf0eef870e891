use chrono::{DateTime, Utc};

/// Wall-clock source for elapsed-time math against backend timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Milliseconds from `start` to `now`, clamped at zero when `start` lies in the future
/// (backend clock ahead of ours).
pub fn elapsed_ms(start: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((now - start).num_milliseconds()).unwrap_or(0)
}
