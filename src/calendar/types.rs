use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use super::errors::CalendarError;

/// Open and close instants of one regular session, in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionHours {
    pub open: DateTime<Utc>,
    pub close: DateTime<Utc>,
    /// Session ends before the configured regular close (half day)
    pub early_close: bool,
}

/// Calendar verdict for a single exchange-local date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TradingDay {
    pub date: NaiveDate,
    session: Option<SessionHours>,
}

impl TradingDay {
    /// A date on which the exchange does not trade
    pub fn closed(date: NaiveDate) -> Self {
        Self { date, session: None }
    }

    /// A trading date; `open` must be strictly before `close`
    pub fn trading(
        date: NaiveDate,
        open: DateTime<Utc>,
        close: DateTime<Utc>,
        early_close: bool,
    ) -> Result<Self, CalendarError> {
        if open >= close {
            return Err(CalendarError::InvalidSession {
                date,
                reason: format!("open {} is not before close {}", open, close),
            });
        }

        Ok(Self {
            date,
            session: Some(SessionHours { open, close, early_close }),
        })
    }

    pub fn is_trading_day(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&SessionHours> {
        self.session.as_ref()
    }

    pub fn open_instant(&self) -> Option<DateTime<Utc>> {
        self.session.map(|s| s.open)
    }

    pub fn close_instant(&self) -> Option<DateTime<Utc>> {
        self.session.map(|s| s.close)
    }
}

/// Authoritative source of trading days for one exchange
pub trait TradingCalendar: Send + Sync {
    /// Exchange identifier, e.g. "XNYS"
    fn calendar_id(&self) -> &str;

    /// Exchange-local timezone used to map instants to dates
    fn timezone(&self) -> Tz;

    fn schedule_for(&self, date: NaiveDate) -> Result<TradingDay, CalendarError>;
}
