#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use tokio::time::Instant;

use market_collector::calendar::{ExchangeCalendar, TradingCalendar, TradingDay};
use market_collector::ingestion::{ErrorLogThrottle, IngestionCycle, IngestionLoop, SleepPolicy};
use market_collector::provider::{MarketDataProvider, ProviderBatch, ProviderError, RawBar};
use market_collector::session::{Clock, SessionClock};
use market_collector::store::MemoryStore;

pub const SYMBOLS: [&str; 4] = ["AAPL", "MSFT", "TSLA", "NVDA"];

pub fn symbols() -> Vec<String> {
    SYMBOLS.iter().map(|s| s.to_string()).collect()
}

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

pub fn nyse() -> ExchangeCalendar {
    ExchangeCalendar::for_exchange(
        "XNYS",
        NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
    )
    .unwrap()
}

/// Wall clock driven by tokio's (pausable) timer: `base` plus the tokio time
/// elapsed since construction. Must be created inside a runtime.
pub struct VirtualClock {
    base: DateTime<Utc>,
    started: Instant,
}

impl VirtualClock {
    pub fn starting_at(base: DateTime<Utc>) -> Self {
        Self {
            base,
            started: Instant::now(),
        }
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.started.elapsed()).unwrap_or(TimeDelta::zero());
        self.base + elapsed
    }
}

/// Provider that publishes one bar per symbol per minute of the session,
/// each minute becoming visible `lag` after it starts. Queued failures are
/// returned first, one per call.
pub struct FakeProvider {
    clock: Arc<dyn Clock>,
    served: Vec<String>,
    lag: TimeDelta,
    failures: Mutex<VecDeque<ProviderError>>,
    calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            served: symbols(),
            lag: TimeDelta::zero(),
            failures: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn serving(mut self, served: &[&str]) -> Self {
        self.served = served.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_lag(mut self, lag: TimeDelta) -> Self {
        self.lag = lag;
        self
    }

    pub fn failing_with(self, errors: Vec<ProviderError>) -> Self {
        self.failures.lock().unwrap().extend(errors);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn sample_bar(minute: DateTime<Utc>, price: f64) -> RawBar {
    RawBar::complete(minute, price, price + 1.0, price - 1.0, price + 0.5, 1_000)
}

#[async_trait]
impl MarketDataProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn fetch_intraday(&self, symbols: &[String], day: &TradingDay) -> Result<ProviderBatch, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        let Some(session) = day.session() else {
            return Ok(ProviderBatch::new());
        };
        let now = self.clock.now();

        let mut batch = ProviderBatch::new();
        for symbol in symbols.iter().filter(|s| self.served.contains(s)) {
            let mut bars = Vec::new();
            let mut minute = session.open;
            while minute < session.close && minute + self.lag <= now {
                bars.push(sample_bar(minute, 100.0));
                minute += TimeDelta::minutes(1);
            }
            if !bars.is_empty() {
                batch.insert(symbol.clone(), bars);
            }
        }
        Ok(batch)
    }
}

/// Loop wired to an NYSE calendar with a 60 minute grace period
pub fn build_loop(
    calendar: Arc<dyn TradingCalendar>,
    clock: Arc<dyn Clock>,
    provider: Arc<dyn MarketDataProvider>,
    store: &MemoryStore,
) -> IngestionLoop<MemoryStore> {
    let session_clock = Arc::new(SessionClock::new(calendar, TimeDelta::minutes(60), clock));
    IngestionLoop::new(
        session_clock,
        IngestionCycle::new(provider, symbols()),
        store.clone(),
        SleepPolicy::default(),
        ErrorLogThrottle::default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_virtual_clock_follows_tokio_time() {
        let clock = VirtualClock::starting_at(utc(2024, 1, 2, 14, 31, 0));
        tokio::time::sleep(std::time::Duration::from_secs(90)).await;
        assert_eq!(clock.now(), utc(2024, 1, 2, 14, 32, 30));
    }
}
