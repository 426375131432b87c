//! Small circuit breaker guarding the refresh endpoint: 3 consecutive
//! failures open the circuit for 1 minute (spec §4.1, §5).

use chrono::{DateTime, Duration, Utc};

const FAILURE_THRESHOLD: u32 = 3;
const OPEN_WINDOW_SECS: i64 = 60;

#[derive(Debug, Default)]
pub struct CircuitBreaker {
    consecutive_failures: u32,
    open_until: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds remaining before the circuit closes, if it's currently open.
    pub fn open_remaining_secs(&self, now: DateTime<Utc>) -> Option<u64> {
        self.open_until.and_then(|until| {
            if now < until {
                Some((until - now).num_seconds().max(0) as u64)
            } else {
                None
            }
        })
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.open_until = None;
    }

    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= FAILURE_THRESHOLD {
            self.open_until = Some(now + Duration::seconds(OPEN_WINDOW_SECS));
        }
    }
}
