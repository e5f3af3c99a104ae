use crate::error::{CollectorError, Result};
use crate::utils::constants::MAX_TIMEOUT_SECS;
use chrono::Utc;
use std::time::Duration;
use tokio::time::Instant;

/// Source of wall-clock unix time in whole seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Clock anchored at a fixed unix time that advances with tokio's monotonic
/// clock. Under a paused runtime it moves only when tasks sleep, which makes
/// boundary alignment reproducible.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    epoch: i64,
    origin: Instant,
}

impl MonotonicClock {
    pub fn starting_at(epoch: i64) -> Self {
        Self {
            epoch,
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> i64 {
        self.epoch + self.origin.elapsed().as_secs() as i64
    }
}

/// Align `timestamp` down to the closest multiple of `period`.
pub fn floor_to_period(timestamp: i64, period: u64) -> i64 {
    let period = period.max(1) as i64;
    timestamp - timestamp.rem_euclid(period)
}

/// Request timeout of `secs` seconds. Anything but a positive, finite value
/// of at most a day is rejected.
pub fn timeout_duration(secs: f64) -> Result<Duration> {
    if !(secs > 0.0 && secs <= MAX_TIMEOUT_SECS) {
        return Err(CollectorError::InvalidArgument(format!(
            "timeout must be within (0, {}] seconds, got {}",
            MAX_TIMEOUT_SECS, secs
        )));
    }
    Ok(Duration::from_secs_f64(secs))
}
