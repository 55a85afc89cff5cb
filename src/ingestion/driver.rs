//! Long-running ingestion driver
//!
//! Each tick classifies the current instant, does the work its phase calls
//! for and reports how long to sleep. Recoverable failures never leave
//! [`IngestionLoop::run`]; only fatal ones do.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::completeness::CompletenessCheck;
use super::cycle::{CycleResult, IngestionCycle};
use super::errors::CollectorError;
use super::schedule::{ErrorLogThrottle, SleepPolicy};
use crate::calendar::TradingDay;
use crate::session::{SessionClock, SessionPhase, SessionState};
use crate::store::StoreConnector;

/// What a tick did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TickAction {
    /// Ran an ingestion cycle
    Ingested(CycleResult),
    /// Grace phase with the final minute already stored
    AlreadyComplete,
    /// Market closed; nothing to do
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    pub phase: SessionPhase,
    pub trading_date: Option<NaiveDate>,
    pub action: TickAction,
    pub sleep: Duration,
}

/// Counters returned when the loop stops cleanly
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoopSummary {
    pub ticks: u64,
    pub failed_ticks: u64,
    pub rows_written: u64,
}

pub struct IngestionLoop<C: StoreConnector> {
    session_clock: Arc<SessionClock>,
    cycle: IngestionCycle,
    completeness: CompletenessCheck,
    connector: C,
    policy: SleepPolicy,
    throttle: ErrorLogThrottle,
}

impl<C: StoreConnector> IngestionLoop<C> {
    pub fn new(
        session_clock: Arc<SessionClock>,
        cycle: IngestionCycle,
        connector: C,
        policy: SleepPolicy,
        throttle: ErrorLogThrottle,
    ) -> Self {
        let completeness = CompletenessCheck::new(Arc::clone(&session_clock));
        Self {
            session_clock,
            cycle,
            completeness,
            connector,
            policy,
            throttle,
        }
    }

    /// One decision step. The store session lives only for the duration of
    /// the phase handler and is released on every exit path.
    pub async fn tick(&self) -> Result<TickReport, CollectorError> {
        let now = self.session_clock.now();
        let state = self.session_clock.classify(now)?;

        let (action, sleep) = match &state {
            SessionState::Closed => {
                let next_open = self.session_clock.next_open_after(now)?;
                debug!(next_open = ?next_open, "Market closed");
                (TickAction::Idle, self.policy.while_closed(now, next_open))
            }
            SessionState::Open(day) => {
                let result = self.ingest(day, now).await?;
                (TickAction::Ingested(result), self.policy.align_to_minute(self.session_clock.now()))
            }
            SessionState::Grace(day) => self.grace(day, now).await?,
        };

        Ok(TickReport {
            at: now,
            phase: state.phase(),
            trading_date: state.trading_day().map(|d| d.date),
            action,
            sleep,
        })
    }

    async fn ingest(&self, day: &TradingDay, now: DateTime<Utc>) -> Result<CycleResult, CollectorError> {
        let mut session = self.connector.acquire().await?;
        self.cycle.run(&mut session, day, now).await
    }

    async fn grace(&self, day: &TradingDay, now: DateTime<Utc>) -> Result<(TickAction, Duration), CollectorError> {
        let mut session = self.connector.acquire().await?;

        let complete = self
            .completeness
            .is_final_minute_complete(&mut session, day.date, self.cycle.symbols())
            .await?;

        if complete {
            drop(session);
            let next_open = self.session_clock.next_open_after(now)?;
            info!(date = %day.date, next_open = ?next_open, "🏁 Final minute stored for all symbols");
            return Ok((TickAction::AlreadyComplete, self.policy.after_complete(now, next_open)));
        }

        let result = self.cycle.run(&mut session, day, now).await?;
        Ok((TickAction::Ingested(result), self.policy.align_to_minute(self.session_clock.now())))
    }

    /// Single tick for an externally scheduled run
    pub async fn run_once(&self) -> Result<TickReport, CollectorError> {
        let report = self.tick().await?;
        log_report(&report);
        Ok(report)
    }

    /// Tick until `shutdown` fires or a fatal error occurs. Shutdown is
    /// observed between ticks; a tick in progress always completes.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<LoopSummary, CollectorError> {
        let mut summary = LoopSummary::default();
        info!(symbols = ?self.cycle.symbols(), "🚀 Ingestion loop started");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            summary.ticks += 1;
            let sleep = match self.tick().await {
                Ok(report) => {
                    self.throttle.record_success();
                    if let TickAction::Ingested(result) = &report.action {
                        summary.rows_written += result.rows_written;
                    }
                    log_report(&report);
                    report.sleep
                }
                Err(e) if e.is_fatal() => {
                    error!(source = e.source_name(), error = %e, "💥 Fatal error, stopping ingestion loop");
                    return Err(e);
                }
                Err(e) => {
                    summary.failed_ticks += 1;
                    let backoff = self.policy.after_error();
                    self.throttle.record_failure(&e, backoff);
                    backoff
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(sleep) => {}
            }
        }

        info!(
            ticks = summary.ticks,
            failed_ticks = summary.failed_ticks,
            rows_written = summary.rows_written,
            "🛑 Ingestion loop stopped"
        );
        Ok(summary)
    }
}

fn log_report(report: &TickReport) {
    match &report.action {
        TickAction::Ingested(result) => debug!(
            phase = %report.phase,
            fetched = result.rows_fetched,
            written = result.rows_written,
            sleep_ms = report.sleep.as_millis() as u64,
            "Tick ingested"
        ),
        TickAction::AlreadyComplete | TickAction::Idle => info!(
            phase = %report.phase,
            date = ?report.trading_date,
            "💤 Sleeping {}s",
            report.sleep.as_secs()
        ),
    }
}
