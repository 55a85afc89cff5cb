/// Collector-wide defaults and fixed values

// Time constants
pub const SECONDS_PER_MINUTE: i64 = 60;
pub const SECONDS_PER_HOUR: i64 = 3600;

// Calendar
pub const DEFAULT_CALENDAR: &str = "XNYS";
pub const DEFAULT_MARKET_OPEN: &str = "09:30";
pub const DEFAULT_MARKET_CLOSE: &str = "16:00";
pub const DEFAULT_GRACE_PERIOD_MINUTES: u32 = 60;
/// Grace must end before the same wall time on the next date
pub const MAX_GRACE_PERIOD_MINUTES: u32 = 24 * 60 - 1;
pub const EARLY_CLOSE_TIME: &str = "13:00";
pub const CALENDAR_FIRST_YEAR: i32 = 1998;
pub const CALENDAR_LAST_YEAR: i32 = 2099;
/// How far the session clock walks the calendar looking for a boundary
pub const BOUNDARY_SEARCH_DAYS: i64 = 14;

// Schedule
pub const DEFAULT_CLOSED_SLEEP_MINUTES: u64 = 30;
pub const DEFAULT_COMPLETE_SLEEP_HOURS: u64 = 6;
pub const DEFAULT_ERROR_BACKOFF_SECONDS: u64 = 30;
pub const DEFAULT_ERROR_LOG_INTERVAL_SECONDS: u64 = 300;

// Symbols
pub const DEFAULT_SYMBOLS: [&str; 4] = ["AAPL", "MSFT", "TSLA", "NVDA"];

// Provider
pub const YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";
pub const YAHOO_CHART_PATH: &str = "/v8/finance/chart";
pub const YAHOO_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) market_collector";
pub const INTERVAL_1M: &str = "1m";
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 20;
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 4;

// Storage
pub const DEFAULT_TABLE_NAME: &str = "market_data";
pub const DB_PASSWORD_ENV: &str = "COLLECTOR_DB_PASSWORD";

// Error context messages
pub const STORE_ACQUIRE_CONTEXT: &str = "acquire store connection";
pub const STORE_UPSERT_CONTEXT: &str = "upsert observation batch";
pub const STORE_COMPLETENESS_CONTEXT: &str = "query final minute symbols";
