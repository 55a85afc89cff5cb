use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use super::errors::CollectorError;
use crate::session::SessionClock;
use crate::store::ObservationStore;

/// Decides whether a session's final minute has been stored for every symbol
pub struct CompletenessCheck {
    session_clock: Arc<SessionClock>,
}

impl CompletenessCheck {
    pub fn new(session_clock: Arc<SessionClock>) -> Self {
        Self { session_clock }
    }

    /// True iff `date` is a trading day and every symbol has an observation
    /// inside its final minute window. Non-trading days are never complete.
    pub async fn is_final_minute_complete<S>(
        &self,
        store: &mut S,
        date: NaiveDate,
        symbols: &[String],
    ) -> Result<bool, CollectorError>
    where
        S: ObservationStore + ?Sized,
    {
        let Some(window) = self.session_clock.final_minute_window(date)? else {
            return Ok(false);
        };

        let present = store.symbols_present_in(&window).await?;
        let missing: Vec<&String> = symbols.iter().filter(|s| !present.contains(*s)).collect();

        debug!(
            %date,
            window_start = %window.start,
            present = present.len(),
            ?missing,
            "Final minute completeness"
        );
        Ok(missing.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::ExchangeCalendar;
    use crate::session::ManualClock;
    use crate::store::{MemoryStore, Observation, StoreConnector};
    use chrono::{DateTime, NaiveTime, TimeDelta, TimeZone, Utc};

    fn check() -> CompletenessCheck {
        let calendar = ExchangeCalendar::for_exchange(
            "XNYS",
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        )
        .unwrap();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap());
        CompletenessCheck::new(Arc::new(SessionClock::new(
            Arc::new(calendar),
            TimeDelta::minutes(60),
            Arc::new(clock),
        )))
    }

    fn observation(symbol: &str, minute: DateTime<Utc>) -> Observation {
        Observation {
            symbol: symbol.to_string(),
            minute,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1,
        }
    }

    fn symbols() -> Vec<String> {
        vec!["AAPL".to_string(), "MSFT".to_string()]
    }

    #[tokio::test]
    async fn test_complete_only_when_every_symbol_present() {
        let check = check();
        let store = MemoryStore::new();
        let mut session = store.acquire().await.unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let final_minute = Utc.with_ymd_and_hms(2024, 1, 2, 20, 59, 0).unwrap();

        assert!(!check.is_final_minute_complete(&mut session, date, &symbols()).await.unwrap());

        session.upsert_batch(&[observation("AAPL", final_minute)]).await.unwrap();
        assert!(!check.is_final_minute_complete(&mut session, date, &symbols()).await.unwrap());

        // a row just before the window does not count
        session
            .upsert_batch(&[observation("MSFT", final_minute - TimeDelta::minutes(1))])
            .await
            .unwrap();
        assert!(!check.is_final_minute_complete(&mut session, date, &symbols()).await.unwrap());

        session.upsert_batch(&[observation("MSFT", final_minute)]).await.unwrap();
        assert!(check.is_final_minute_complete(&mut session, date, &symbols()).await.unwrap());

        // monotonic: further writes never undo completeness
        session.upsert_batch(&[observation("AAPL", final_minute)]).await.unwrap();
        assert!(check.is_final_minute_complete(&mut session, date, &symbols()).await.unwrap());
    }

    #[tokio::test]
    async fn test_early_close_uses_shortened_window() {
        let check = check();
        let store = MemoryStore::new();
        let mut session = store.acquire().await.unwrap();
        // Friday after Thanksgiving 2024 closes at 13:00 ET (18:00Z)
        let date = NaiveDate::from_ymd_opt(2024, 11, 29).unwrap();
        let final_minute = Utc.with_ymd_and_hms(2024, 11, 29, 17, 59, 0).unwrap();

        session
            .upsert_batch(&[observation("AAPL", final_minute), observation("MSFT", final_minute)])
            .await
            .unwrap();
        assert!(check.is_final_minute_complete(&mut session, date, &symbols()).await.unwrap());
    }

    #[tokio::test]
    async fn test_non_trading_day_is_never_complete() {
        let check = check();
        let store = MemoryStore::new();
        let mut session = store.acquire().await.unwrap();
        let holiday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(!check.is_final_minute_complete(&mut session, holiday, &symbols()).await.unwrap());
    }
}
