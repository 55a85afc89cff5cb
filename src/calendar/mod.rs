pub mod errors;
pub mod exchange;
pub mod holidays;
pub mod types;

pub use errors::CalendarError;
pub use exchange::{CalendarOverrides, ExchangeCalendar};
pub use types::{SessionHours, TradingCalendar, TradingDay};
