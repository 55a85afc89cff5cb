use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
    #[error("Exchange calendar unavailable: {0}")]
    Unavailable(String),

    #[error("Date {0} is outside the supported calendar range")]
    OutOfRange(NaiveDate),

    #[error("Invalid session on {date}: {reason}")]
    InvalidSession { date: NaiveDate, reason: String },

    #[error("Invalid session hours: {0}")]
    InvalidHours(String),
}
