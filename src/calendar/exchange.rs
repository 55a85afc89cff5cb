use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{debug, info};

use super::errors::CalendarError;
use super::holidays::{classify_us_equity_day, DayKind};
use super::types::{TradingCalendar, TradingDay};
use crate::common::constants::{CALENDAR_FIRST_YEAR, CALENDAR_LAST_YEAR, EARLY_CLOSE_TIME};
use crate::common::time_utils::parse_hhmm;

/// Extra closures and half days layered on top of the exchange rules
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalendarOverrides {
    #[serde(default)]
    pub closures: Vec<ClosureOverride>,
    #[serde(default)]
    pub early_closes: Vec<EarlyCloseOverride>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClosureOverride {
    pub date: NaiveDate,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EarlyCloseOverride {
    pub date: NaiveDate,
    /// Exchange-local "HH:MM"
    pub close: String,
}

impl CalendarOverrides {
    /// Load overrides from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CalendarError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CalendarError::Unavailable(format!("cannot read calendar overrides '{}': {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            CalendarError::Unavailable(format!("cannot parse calendar overrides '{}': {}", path.display(), e))
        })
    }
}

/// Rule-based calendar for US equity exchanges
#[derive(Debug, Clone)]
pub struct ExchangeCalendar {
    id: String,
    timezone: Tz,
    regular_open: NaiveTime,
    regular_close: NaiveTime,
    early_close: NaiveTime,
    closures: HashMap<NaiveDate, String>,
    early_closes: HashMap<NaiveDate, NaiveTime>,
}

impl ExchangeCalendar {
    /// Calendar for a named exchange with the given regular session hours
    pub fn for_exchange(
        id: &str,
        regular_open: NaiveTime,
        regular_close: NaiveTime,
    ) -> Result<Self, CalendarError> {
        let canonical = match id.trim().to_ascii_uppercase().as_str() {
            "XNYS" | "NYSE" => "XNYS",
            "XNAS" | "NASDAQ" => "XNAS",
            other => {
                return Err(CalendarError::Unavailable(format!(
                    "unknown exchange calendar '{}' (supported: XNYS, XNAS)",
                    other
                )))
            }
        };

        let early_close = parse_hhmm(EARLY_CLOSE_TIME).map_err(CalendarError::Unavailable)?;
        let shortest_close = early_close.min(regular_close);
        if regular_open >= shortest_close {
            return Err(CalendarError::InvalidHours(format!(
                "open {} must be before close {} and the {} early close",
                regular_open, regular_close, early_close
            )));
        }

        info!(
            calendar = canonical,
            open = %regular_open,
            close = %regular_close,
            "📅 Exchange calendar ready"
        );

        Ok(Self {
            id: canonical.to_string(),
            timezone: chrono_tz::America::New_York,
            regular_open,
            regular_close,
            early_close,
            closures: HashMap::new(),
            early_closes: HashMap::new(),
        })
    }

    /// Layer additional closures and half days over the rules
    pub fn with_overrides(mut self, overrides: CalendarOverrides) -> Result<Self, CalendarError> {
        for closure in overrides.closures {
            let reason = closure.reason.unwrap_or_else(|| "override".to_string());
            self.closures.insert(closure.date, reason);
        }
        for early in overrides.early_closes {
            let close = parse_hhmm(&early.close).map_err(CalendarError::Unavailable)?;
            if close <= self.regular_open {
                return Err(CalendarError::InvalidSession {
                    date: early.date,
                    reason: format!("early close {} is not after open {}", close, self.regular_open),
                });
            }
            self.early_closes.insert(early.date, close);
        }

        info!(
            closures = self.closures.len(),
            early_closes = self.early_closes.len(),
            "📅 Calendar overrides applied"
        );
        Ok(self)
    }

    /// Convert an exchange-local wall time to a UTC instant
    fn localize(&self, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Utc>, CalendarError> {
        self.timezone
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| CalendarError::InvalidSession {
                date,
                reason: format!("local time {} does not exist in {}", time, self.timezone),
            })
    }

    fn session(&self, date: NaiveDate, close_time: NaiveTime, early: bool) -> Result<TradingDay, CalendarError> {
        let open = self.localize(date, self.regular_open)?;
        let close = self.localize(date, close_time)?;
        TradingDay::trading(date, open, close, early)
    }
}

impl TradingCalendar for ExchangeCalendar {
    fn calendar_id(&self) -> &str {
        &self.id
    }

    fn timezone(&self) -> Tz {
        self.timezone
    }

    fn schedule_for(&self, date: NaiveDate) -> Result<TradingDay, CalendarError> {
        if date.year() < CALENDAR_FIRST_YEAR || date.year() > CALENDAR_LAST_YEAR {
            return Err(CalendarError::OutOfRange(date));
        }

        if let Some(reason) = self.closures.get(&date) {
            debug!(%date, reason = %reason, "Closed by calendar override");
            return Ok(TradingDay::closed(date));
        }

        if let Some(close) = self.early_closes.get(&date) {
            let close = (*close).min(self.regular_close);
            return self.session(date, close, close < self.regular_close);
        }

        match classify_us_equity_day(date) {
            DayKind::Weekend => Ok(TradingDay::closed(date)),
            DayKind::Holiday(name) => {
                debug!(%date, holiday = name, "Exchange holiday");
                Ok(TradingDay::closed(date))
            }
            DayKind::EarlyClose(name) => {
                let close = self.early_close.min(self.regular_close);
                debug!(%date, reason = name, close = %close, "Early close");
                self.session(date, close, close < self.regular_close)
            }
            DayKind::Regular => self.session(date, self.regular_close, false),
        }
    }
}
