//! Market session classification
//!
//! Every decision is a pure function of the calendar's answer for a date and
//! the configured grace duration. Windows are half-open: OPEN is
//! `[open, close)` and GRACE is `[close, close + grace)`, so the close
//! instant itself belongs to GRACE.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use serde::Serialize;

use super::clock::Clock;
use crate::calendar::{CalendarError, TradingCalendar, TradingDay};
use crate::common::constants::{BOUNDARY_SEARCH_DAYS, SECONDS_PER_MINUTE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionPhase {
    Closed,
    Open,
    Grace,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Closed => write!(f, "CLOSED"),
            SessionPhase::Open => write!(f, "OPEN"),
            SessionPhase::Grace => write!(f, "GRACE"),
        }
    }
}

/// Phase of an instant together with the trading day it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Open(TradingDay),
    Grace(TradingDay),
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Closed => SessionPhase::Closed,
            SessionState::Open(_) => SessionPhase::Open,
            SessionState::Grace(_) => SessionPhase::Grace,
        }
    }

    pub fn trading_day(&self) -> Option<&TradingDay> {
        match self {
            SessionState::Closed => None,
            SessionState::Open(day) | SessionState::Grace(day) => Some(day),
        }
    }
}

/// Last tradable minute of a session: `[close - 1 minute, close)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FinalMinuteWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FinalMinuteWindow {
    pub fn ending_at(close: DateTime<Utc>) -> Self {
        Self {
            start: close - TimeDelta::seconds(SECONDS_PER_MINUTE),
            end: close,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

pub struct SessionClock {
    calendar: Arc<dyn TradingCalendar>,
    grace: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl SessionClock {
    pub fn new(calendar: Arc<dyn TradingCalendar>, grace: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self { calendar, grace, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Exchange-local calendar date of an instant
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.calendar.timezone()).date_naive()
    }

    pub fn classify(&self, instant: DateTime<Utc>) -> Result<SessionState, CalendarError> {
        let date = self.local_date(instant);
        let today = self.calendar.schedule_for(date)?;

        if let Some(state) = self.state_within(&today, instant) {
            return Ok(state);
        }

        // A long grace window can run past local midnight into later dates.
        // Any session on a date before `cursor` closed before `cursor`'s
        // midnight, so its grace cannot reach past that midnight plus grace.
        let mut cursor = date;
        while instant < self.local_midnight(cursor) + self.grace {
            let Some(previous) = cursor.pred_opt() else { break };
            let earlier = self.calendar.schedule_for(previous)?;
            if let Some(state @ SessionState::Grace(_)) = self.state_within(&earlier, instant) {
                return Ok(state);
            }
            cursor = previous;
        }

        Ok(SessionState::Closed)
    }

    pub fn phase_at(&self, instant: DateTime<Utc>) -> Result<SessionPhase, CalendarError> {
        self.classify(instant).map(|state| state.phase())
    }

    /// Classification of the injected clock's current instant
    pub fn current_state(&self) -> Result<SessionState, CalendarError> {
        self.classify(self.now())
    }

    /// Final minute of the session on `date`; `None` on non-trading days
    pub fn final_minute_window(&self, date: NaiveDate) -> Result<Option<FinalMinuteWindow>, CalendarError> {
        let day = self.calendar.schedule_for(date)?;
        Ok(day.close_instant().map(FinalMinuteWindow::ending_at))
    }

    /// First phase boundary strictly after `instant`
    pub fn next_boundary_after(&self, instant: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, CalendarError> {
        let date = self.local_date(instant);
        let mut next: Option<DateTime<Utc>> = None;
        for offset in -self.grace_lookback_days()..=BOUNDARY_SEARCH_DAYS {
            let Some(day) = shift_date(date, offset) else { continue };
            let schedule = self.calendar.schedule_for(day)?;
            // later sessions open later still
            if let (Some(best), Some(open)) = (next, schedule.open_instant()) {
                if open > best {
                    break;
                }
            }
            if let Some(boundary) = self.boundaries(&schedule).into_iter().find(|b| *b > instant) {
                next = Some(next.map_or(boundary, |best| best.min(boundary)));
            }
        }
        Ok(next)
    }

    /// Latest phase boundary at or before `instant`
    pub fn previous_boundary_at_or_before(
        &self,
        instant: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, CalendarError> {
        let date = self.local_date(instant);
        let mut previous: Option<DateTime<Utc>> = None;
        for offset in (-(BOUNDARY_SEARCH_DAYS + self.grace_lookback_days())..=0).rev() {
            let Some(day) = shift_date(date, offset) else { continue };
            let schedule = self.calendar.schedule_for(day)?;
            // earlier sessions end their grace earlier still
            if let (Some(best), Some(close)) = (previous, schedule.close_instant()) {
                if close + self.grace < best {
                    break;
                }
            }
            if let Some(boundary) = self.boundaries(&schedule).into_iter().rev().find(|b| *b <= instant) {
                previous = Some(previous.map_or(boundary, |best| best.max(boundary)));
            }
        }
        Ok(previous)
    }

    /// Open instant of the next session starting strictly after `instant`
    pub fn next_open_after(&self, instant: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, CalendarError> {
        let date = self.local_date(instant);
        for offset in 0..=BOUNDARY_SEARCH_DAYS {
            let Some(day) = shift_date(date, offset) else { continue };
            if let Some(open) = self.calendar.schedule_for(day)?.open_instant() {
                if open > instant {
                    return Ok(Some(open));
                }
            }
        }
        Ok(None)
    }

    fn state_within(&self, day: &TradingDay, instant: DateTime<Utc>) -> Option<SessionState> {
        let session = day.session()?;
        if session.open <= instant && instant < session.close {
            Some(SessionState::Open(*day))
        } else if session.close <= instant && instant < session.close + self.grace {
            Some(SessionState::Grace(*day))
        } else {
            None
        }
    }

    /// Earlier dates whose grace window can still reach the current date
    fn grace_lookback_days(&self) -> i64 {
        self.grace.num_days() + 1
    }

    fn boundaries(&self, day: &TradingDay) -> Vec<DateTime<Utc>> {
        match day.session() {
            Some(s) => vec![s.open, s.close, s.close + self.grace],
            None => Vec::new(),
        }
    }

    fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        self.calendar
            .timezone()
            .from_local_datetime(&date.and_time(NaiveTime::default()))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&date.and_time(NaiveTime::default())))
    }
}

fn shift_date(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    date.checked_add_signed(TimeDelta::days(days))
}
