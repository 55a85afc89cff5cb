use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, error, info};

use super::errors::CollectorError;
use crate::common::constants::{
    DEFAULT_CLOSED_SLEEP_MINUTES, DEFAULT_COMPLETE_SLEEP_HOURS, DEFAULT_ERROR_BACKOFF_SECONDS,
    DEFAULT_ERROR_LOG_INTERVAL_SECONDS, SECONDS_PER_HOUR, SECONDS_PER_MINUTE,
};
use crate::common::time_utils::{duration_between, until_next_minute};

/// How long the loop sleeps after each kind of tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SleepPolicy {
    pub closed_sleep: Duration,
    pub complete_sleep: Duration,
    pub error_backoff: Duration,
}

impl Default for SleepPolicy {
    fn default() -> Self {
        Self {
            closed_sleep: Duration::from_secs(DEFAULT_CLOSED_SLEEP_MINUTES * SECONDS_PER_MINUTE as u64),
            complete_sleep: Duration::from_secs(DEFAULT_COMPLETE_SLEEP_HOURS * SECONDS_PER_HOUR as u64),
            error_backoff: Duration::from_secs(DEFAULT_ERROR_BACKOFF_SECONDS),
        }
    }
}

impl SleepPolicy {
    /// After an ingesting tick: wake at the next wall-clock minute
    pub fn align_to_minute(&self, now: DateTime<Utc>) -> Duration {
        until_next_minute(now)
    }

    /// After the day is known complete; never sleeps through the next open
    pub fn after_complete(&self, now: DateTime<Utc>, next_open: Option<DateTime<Utc>>) -> Duration {
        cap_at(self.complete_sleep, now, next_open)
    }

    /// Outside any session; never sleeps through the next open
    pub fn while_closed(&self, now: DateTime<Utc>, next_open: Option<DateTime<Utc>>) -> Duration {
        cap_at(self.closed_sleep, now, next_open)
    }

    pub fn after_error(&self) -> Duration {
        self.error_backoff
    }
}

fn cap_at(sleep: Duration, now: DateTime<Utc>, until: Option<DateTime<Utc>>) -> Duration {
    match until {
        Some(instant) if instant > now => sleep.min(duration_between(now, instant)),
        _ => sleep,
    }
}

/// Rate-limits error logging under a sustained outage. The first failure
/// after a success is logged at ERROR; repeats inside `interval` go to DEBUG
/// and are counted into the next ERROR line.
#[derive(Debug)]
pub struct ErrorLogThrottle {
    interval: Duration,
    last_logged: Option<Instant>,
    suppressed: u64,
    consecutive_failures: u64,
}

impl Default for ErrorLogThrottle {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_ERROR_LOG_INTERVAL_SECONDS))
    }
}

impl ErrorLogThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_logged: None,
            suppressed: 0,
            consecutive_failures: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures
    }

    /// Record a failed tick; returns true when it was logged at ERROR
    pub fn record_failure(&mut self, err: &CollectorError, backoff: Duration) -> bool {
        self.consecutive_failures += 1;
        let now = Instant::now();

        let due = match self.last_logged {
            None => true,
            Some(at) => now.duration_since(at) >= self.interval,
        };

        if due {
            error!(
                source = err.source_name(),
                error = %err,
                consecutive_failures = self.consecutive_failures,
                suppressed = self.suppressed,
                backoff_secs = backoff.as_secs(),
                "❌ Tick failed, backing off"
            );
            self.last_logged = Some(now);
            self.suppressed = 0;
        } else {
            self.suppressed += 1;
            debug!(source = err.source_name(), error = %err, "Tick failed again (suppressed)");
        }
        due
    }

    /// Record a successful tick, reporting recovery after a failure streak
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 {
            info!(
                failed_ticks = self.consecutive_failures,
                "✅ Recovered after {} failed tick(s)",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.suppressed = 0;
        self.last_logged = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use chrono::{TimeDelta, TimeZone};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, h, m, s).unwrap()
    }

    #[test]
    fn test_default_policy() {
        let policy = SleepPolicy::default();
        assert_eq!(policy.closed_sleep, Duration::from_secs(30 * 60));
        assert_eq!(policy.complete_sleep, Duration::from_secs(6 * 3600));
        assert_eq!(policy.error_backoff, Duration::from_secs(30));
    }

    #[test]
    fn test_align_to_minute() {
        let policy = SleepPolicy::default();
        assert_eq!(policy.align_to_minute(at(14, 31, 42)), Duration::from_secs(18));
    }

    #[test]
    fn test_sleeps_are_capped_at_next_open() {
        let policy = SleepPolicy::default();
        let now = at(14, 10, 0);
        let open = at(14, 30, 0);

        assert_eq!(policy.while_closed(now, Some(open)), Duration::from_secs(20 * 60));
        assert_eq!(policy.while_closed(now, None), Duration::from_secs(30 * 60));
        assert_eq!(
            policy.after_complete(now, Some(now + TimeDelta::hours(17))),
            Duration::from_secs(6 * 3600)
        );
        // an open already in the past leaves the sleep alone
        assert_eq!(policy.while_closed(now, Some(now - TimeDelta::minutes(1))), Duration::from_secs(30 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_log_throttle() {
        let mut throttle = ErrorLogThrottle::new(Duration::from_secs(300));
        let err = CollectorError::from(ProviderError::Timeout("slow".into()));
        let backoff = Duration::from_secs(30);

        assert!(throttle.record_failure(&err, backoff));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!throttle.record_failure(&err, backoff));
        tokio::time::advance(Duration::from_secs(300)).await;
        assert!(throttle.record_failure(&err, backoff));
        assert_eq!(throttle.consecutive_failures(), 3);

        throttle.record_success();
        assert_eq!(throttle.consecutive_failures(), 0);
        // first failure after recovery is logged again
        assert!(throttle.record_failure(&err, backoff));
    }
}
