//! TOML configuration, converted once at startup into an immutable [`AppConfig`]

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveTime, TimeDelta};
use serde::Deserialize;
use thiserror::Error;

use crate::calendar::{CalendarError, CalendarOverrides, ExchangeCalendar};
use crate::common::constants::{
    DB_PASSWORD_ENV, DEFAULT_CALENDAR, DEFAULT_CLOSED_SLEEP_MINUTES, DEFAULT_COMPLETE_SLEEP_HOURS,
    DEFAULT_ERROR_BACKOFF_SECONDS, DEFAULT_ERROR_LOG_INTERVAL_SECONDS, DEFAULT_GRACE_PERIOD_MINUTES,
    DEFAULT_MARKET_CLOSE, DEFAULT_MARKET_OPEN, DEFAULT_SYMBOLS, EARLY_CLOSE_TIME, MAX_GRACE_PERIOD_MINUTES,
    SECONDS_PER_HOUR, SECONDS_PER_MINUTE,
};
use crate::common::time_utils::parse_hhmm;
use crate::ingestion::{ErrorLogThrottle, SleepPolicy};
use crate::logging::{LogRotation, LoggingConfig};
use crate::postgres::{is_valid_identifier, PostgresConfig};
use crate::provider::ProviderConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required credential: {0}")]
    MissingCredential(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DatabaseTomlConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub max_connections: Option<usize>,
    pub connection_timeout_seconds: Option<u64>,
    pub statement_timeout_seconds: Option<u64>,
    pub table: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CollectorTomlConfig {
    pub symbols: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SessionTomlConfig {
    pub calendar: Option<String>,
    pub market_open: Option<String>,
    pub market_close: Option<String>,
    pub grace_period_minutes: Option<u32>,
    pub calendar_overrides: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ScheduleTomlConfig {
    pub closed_sleep_minutes: Option<u64>,
    pub complete_sleep_hours: Option<u64>,
    pub error_backoff_seconds: Option<u64>,
    pub error_log_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProviderTomlConfig {
    pub base_url: Option<String>,
    pub request_timeout_seconds: Option<u64>,
    pub max_concurrent_requests: Option<usize>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LoggingTomlConfig {
    pub log_dir: Option<String>,
    pub level_filter: Option<String>,
    pub rotation: Option<String>, // "daily", "hourly", or "size:<MB>"
    pub console_timestamps: Option<bool>,
    pub file_json_format: Option<bool>,
    pub max_log_files: Option<usize>,
    pub cleanup_days: Option<u32>,
}

/// Full TOML configuration structure; every section is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    pub database: Option<DatabaseTomlConfig>,
    pub collector: Option<CollectorTomlConfig>,
    pub session: Option<SessionTomlConfig>,
    pub schedule: Option<ScheduleTomlConfig>,
    pub provider: Option<ProviderTomlConfig>,
    pub logging: Option<LoggingTomlConfig>,
}

/// Exchange session parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub calendar: String,
    pub market_open: NaiveTime,
    pub market_close: NaiveTime,
    pub grace_period: TimeDelta,
    pub calendar_overrides: Option<PathBuf>,
}

impl SessionSettings {
    /// Calendar for the configured exchange, with overrides applied
    pub fn build_calendar(&self) -> Result<ExchangeCalendar, CalendarError> {
        let calendar = ExchangeCalendar::for_exchange(&self.calendar, self.market_open, self.market_close)?;
        match &self.calendar_overrides {
            Some(path) => calendar.with_overrides(CalendarOverrides::from_file(path)?),
            None => Ok(calendar),
        }
    }
}

/// Loop sleep and error-logging durations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSettings {
    pub closed_sleep: Duration,
    pub complete_sleep: Duration,
    pub error_backoff: Duration,
    pub error_log_interval: Duration,
}

impl ScheduleSettings {
    pub fn sleep_policy(&self) -> SleepPolicy {
        SleepPolicy {
            closed_sleep: self.closed_sleep,
            complete_sleep: self.complete_sleep,
            error_backoff: self.error_backoff,
        }
    }

    pub fn error_log_throttle(&self) -> ErrorLogThrottle {
        ErrorLogThrottle::new(self.error_log_interval)
    }
}

/// Immutable process configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: PostgresConfig,
    pub symbols: Vec<String>,
    pub session: SessionSettings,
    pub schedule: ScheduleSettings,
    pub provider: ProviderConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load from a TOML file; `COLLECTOR_DB_PASSWORD` overrides the file's password
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, std::env::var(DB_PASSWORD_ENV).ok())
    }

    /// Defaults only, with the password taken from the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_toml_config(TomlConfig::default(), std::env::var(DB_PASSWORD_ENV).ok())
    }

    pub fn from_toml_str(content: &str, password_override: Option<String>) -> Result<Self, ConfigError> {
        let toml_config: TomlConfig = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_toml_config(toml_config, password_override)
    }

    fn from_toml_config(toml_config: TomlConfig, password_override: Option<String>) -> Result<Self, ConfigError> {
        let database = convert_database(toml_config.database.unwrap_or_default(), password_override)?;
        let symbols = convert_symbols(toml_config.collector.unwrap_or_default())?;
        let session = convert_session(toml_config.session.unwrap_or_default())?;
        let schedule = convert_schedule(toml_config.schedule.unwrap_or_default())?;
        let provider = convert_provider(toml_config.provider.unwrap_or_default())?;
        let logging = convert_logging(toml_config.logging.unwrap_or_default());

        Ok(Self {
            database,
            symbols,
            session,
            schedule,
            provider,
            logging,
        })
    }
}

fn require_positive(name: &str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(format!("{} must be greater than zero", name)));
    }
    Ok(value)
}

fn scaled_seconds(name: &str, value: u64, unit_seconds: i64) -> Result<u64, ConfigError> {
    value
        .checked_mul(unit_seconds as u64)
        .ok_or_else(|| ConfigError::Invalid(format!("{} is too large", name)))
}

fn convert_database(raw: DatabaseTomlConfig, password_override: Option<String>) -> Result<PostgresConfig, ConfigError> {
    let defaults = PostgresConfig::default();

    let password = password_override
        .filter(|p| !p.is_empty())
        .or(raw.password)
        .unwrap_or_default();
    if password.is_empty() {
        return Err(ConfigError::MissingCredential(format!(
            "database.password (or {})",
            DB_PASSWORD_ENV
        )));
    }

    let table = raw.table.unwrap_or(defaults.table);
    if !is_valid_identifier(&table) {
        return Err(ConfigError::Invalid(format!("database.table {:?} is not a plain SQL identifier", table)));
    }

    Ok(PostgresConfig {
        host: raw.host.unwrap_or(defaults.host),
        port: raw.port.unwrap_or(defaults.port),
        database: raw.database.unwrap_or(defaults.database),
        username: raw.username.unwrap_or(defaults.username),
        password,
        max_connections: require_positive(
            "database.max_connections",
            raw.max_connections.unwrap_or(defaults.max_connections) as u64,
        )? as usize,
        connection_timeout_seconds: require_positive(
            "database.connection_timeout_seconds",
            raw.connection_timeout_seconds.unwrap_or(defaults.connection_timeout_seconds),
        )?,
        statement_timeout_seconds: require_positive(
            "database.statement_timeout_seconds",
            raw.statement_timeout_seconds.unwrap_or(defaults.statement_timeout_seconds),
        )?,
        table,
    })
}

fn convert_symbols(raw: CollectorTomlConfig) -> Result<Vec<String>, ConfigError> {
    let configured = raw
        .symbols
        .unwrap_or_else(|| DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect());

    let mut symbols: Vec<String> = Vec::with_capacity(configured.len());
    for symbol in configured {
        let symbol = symbol.trim().to_uppercase();
        if !symbol.is_empty() && !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }

    if symbols.is_empty() {
        return Err(ConfigError::Invalid("collector.symbols must not be empty".to_string()));
    }
    Ok(symbols)
}

fn convert_session(raw: SessionTomlConfig) -> Result<SessionSettings, ConfigError> {
    let market_open = parse_hhmm(raw.market_open.as_deref().unwrap_or(DEFAULT_MARKET_OPEN))
        .map_err(|e| ConfigError::Invalid(format!("session.market_open: {}", e)))?;
    let market_close = parse_hhmm(raw.market_close.as_deref().unwrap_or(DEFAULT_MARKET_CLOSE))
        .map_err(|e| ConfigError::Invalid(format!("session.market_close: {}", e)))?;

    if market_open >= market_close {
        return Err(ConfigError::Invalid(format!(
            "session.market_open {} must be before session.market_close {}",
            market_open, market_close
        )));
    }

    // half days close at the early close time, which must still follow the open
    let early_close = parse_hhmm(EARLY_CLOSE_TIME).map_err(ConfigError::Invalid)?;
    if market_open >= early_close {
        return Err(ConfigError::Invalid(format!(
            "session.market_open {} must be before the {} early close",
            market_open, early_close
        )));
    }

    let grace_minutes = raw.grace_period_minutes.unwrap_or(DEFAULT_GRACE_PERIOD_MINUTES);
    if grace_minutes > MAX_GRACE_PERIOD_MINUTES {
        return Err(ConfigError::Invalid(format!(
            "session.grace_period_minutes must be at most {}",
            MAX_GRACE_PERIOD_MINUTES
        )));
    }

    Ok(SessionSettings {
        calendar: raw.calendar.unwrap_or_else(|| DEFAULT_CALENDAR.to_string()),
        market_open,
        market_close,
        grace_period: TimeDelta::minutes(grace_minutes as i64),
        calendar_overrides: raw.calendar_overrides.map(PathBuf::from),
    })
}

fn convert_schedule(raw: ScheduleTomlConfig) -> Result<ScheduleSettings, ConfigError> {
    let closed_minutes = require_positive(
        "schedule.closed_sleep_minutes",
        raw.closed_sleep_minutes.unwrap_or(DEFAULT_CLOSED_SLEEP_MINUTES),
    )?;
    let complete_hours = require_positive(
        "schedule.complete_sleep_hours",
        raw.complete_sleep_hours.unwrap_or(DEFAULT_COMPLETE_SLEEP_HOURS),
    )?;
    let backoff_seconds = require_positive(
        "schedule.error_backoff_seconds",
        raw.error_backoff_seconds.unwrap_or(DEFAULT_ERROR_BACKOFF_SECONDS),
    )?;
    let log_interval_seconds = require_positive(
        "schedule.error_log_interval_seconds",
        raw.error_log_interval_seconds.unwrap_or(DEFAULT_ERROR_LOG_INTERVAL_SECONDS),
    )?;

    Ok(ScheduleSettings {
        closed_sleep: Duration::from_secs(scaled_seconds(
            "schedule.closed_sleep_minutes",
            closed_minutes,
            SECONDS_PER_MINUTE,
        )?),
        complete_sleep: Duration::from_secs(scaled_seconds(
            "schedule.complete_sleep_hours",
            complete_hours,
            SECONDS_PER_HOUR,
        )?),
        error_backoff: Duration::from_secs(backoff_seconds),
        error_log_interval: Duration::from_secs(log_interval_seconds),
    })
}

fn convert_provider(raw: ProviderTomlConfig) -> Result<ProviderConfig, ConfigError> {
    let defaults = ProviderConfig::default();
    Ok(ProviderConfig {
        base_url: raw.base_url.unwrap_or(defaults.base_url),
        request_timeout_seconds: require_positive(
            "provider.request_timeout_seconds",
            raw.request_timeout_seconds.unwrap_or(defaults.request_timeout_seconds),
        )?,
        max_concurrent_requests: require_positive(
            "provider.max_concurrent_requests",
            raw.max_concurrent_requests.unwrap_or(defaults.max_concurrent_requests) as u64,
        )? as usize,
        user_agent: raw.user_agent.unwrap_or(defaults.user_agent),
    })
}

fn convert_logging(raw: LoggingTomlConfig) -> LoggingConfig {
    let defaults = LoggingConfig::default();
    LoggingConfig {
        log_dir: raw.log_dir.unwrap_or(defaults.log_dir),
        level_filter: raw.level_filter.unwrap_or(defaults.level_filter),
        rotation: raw.rotation.as_deref().map(LogRotation::parse).unwrap_or(defaults.rotation),
        console_timestamps: raw.console_timestamps.unwrap_or(defaults.console_timestamps),
        file_json_format: raw.file_json_format.unwrap_or(defaults.file_json_format),
        max_log_files: raw.max_log_files.unwrap_or(defaults.max_log_files),
        cleanup_days: raw.cleanup_days.unwrap_or(defaults.cleanup_days),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL_CONFIG: &str = r#"
        [database]
        host = "db.internal"
        port = 5433
        database = "ticks"
        username = "collector"
        password = "from-file"
        table = "minute_bars"

        [collector]
        symbols = ["aapl", " MSFT ", "AAPL", "spy"]

        [session]
        calendar = "NASDAQ"
        market_open = "09:30"
        market_close = "16:00"
        grace_period_minutes = 45

        [schedule]
        closed_sleep_minutes = 15
        complete_sleep_hours = 4
        error_backoff_seconds = 10

        [provider]
        request_timeout_seconds = 5
        max_concurrent_requests = 2

        [logging]
        log_dir = "/var/log/collector"
        rotation = "hourly"
    "#;

    #[test]
    fn test_full_config() {
        let config = AppConfig::from_toml_str(FULL_CONFIG, None).unwrap();

        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 5433);
        assert_eq!(config.database.password, "from-file");
        assert_eq!(config.database.table, "minute_bars");
        assert_eq!(config.symbols, vec!["AAPL", "MSFT", "SPY"]);
        assert_eq!(config.session.calendar, "NASDAQ");
        assert_eq!(config.session.grace_period, TimeDelta::minutes(45));
        assert_eq!(config.schedule.closed_sleep, Duration::from_secs(15 * 60));
        assert_eq!(config.schedule.complete_sleep, Duration::from_secs(4 * 3600));
        assert_eq!(config.schedule.error_backoff, Duration::from_secs(10));
        assert_eq!(config.schedule.error_log_interval, Duration::from_secs(300));
        assert_eq!(config.provider.max_concurrent_requests, 2);
        assert_eq!(config.logging.rotation, LogRotation::Hourly);
    }

    #[test]
    fn test_defaults_with_env_password() {
        let config = AppConfig::from_toml_str("", Some("secret".to_string())).unwrap();
        assert_eq!(config.symbols, vec!["AAPL", "MSFT", "TSLA", "NVDA"]);
        assert_eq!(config.session.calendar, "XNYS");
        assert_eq!(config.session.market_open, NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert_eq!(config.session.market_close, NaiveTime::from_hms_opt(16, 0, 0).unwrap());
        assert_eq!(config.session.grace_period, TimeDelta::minutes(60));
        assert_eq!(config.schedule.sleep_policy(), SleepPolicy::default());
        assert_eq!(config.database.table, "market_data");
    }

    #[test]
    fn test_password_override_wins() {
        let config = AppConfig::from_toml_str(FULL_CONFIG, Some("from-env".to_string())).unwrap();
        assert_eq!(config.database.password, "from-env");

        // an empty override falls back to the file
        let config = AppConfig::from_toml_str(FULL_CONFIG, Some(String::new())).unwrap();
        assert_eq!(config.database.password, "from-file");
    }

    #[test]
    fn test_missing_password_is_fatal() {
        let err = AppConfig::from_toml_str("[database]\nhost = \"x\"", None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential(_)));

        let err = AppConfig::from_toml_str("[database]\npassword = \"\"", None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let pw = || Some("secret".to_string());
        let cases = [
            "[collector]\nsymbols = []",
            "[collector]\nsymbols = [\" \"]",
            "[session]\nmarket_open = \"9h30\"",
            "[session]\nmarket_open = \"16:00\"\nmarket_close = \"09:30\"",
            "[session]\nmarket_open = \"13:30\"\nmarket_close = \"16:00\"",
            "[session]\nmarket_open = \"13:00\"",
            "[session]\ngrace_period_minutes = 1440",
            "[session]\ngrace_period_minutes = 4200",
            "[schedule]\nclosed_sleep_minutes = 9000000000000000000",
            "[schedule]\ncomplete_sleep_hours = 9000000000000000000",
            "[schedule]\nerror_backoff_seconds = 0",
            "[provider]\nmax_concurrent_requests = 0",
            "[database]\ntable = \"bars; drop\"",
        ];
        for case in cases {
            assert!(
                matches!(AppConfig::from_toml_str(case, pw()), Err(ConfigError::Invalid(_))),
                "expected rejection for {case:?}"
            );
        }

        assert!(matches!(
            AppConfig::from_toml_str("[unknown]\nx = 1", pw()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_session_limits_accepted() {
        let pw = || Some("secret".to_string());

        let config = AppConfig::from_toml_str("[session]\ngrace_period_minutes = 1439", pw()).unwrap();
        assert_eq!(config.session.grace_period, TimeDelta::minutes(1439));

        let config = AppConfig::from_toml_str("[session]\ngrace_period_minutes = 0", pw()).unwrap();
        assert_eq!(config.session.grace_period, TimeDelta::zero());

        // an open just before the early close still yields a valid half day
        let config = AppConfig::from_toml_str("[session]\nmarket_open = \"12:59\"", pw()).unwrap();
        let calendar = config.session.build_calendar().unwrap();
        use crate::calendar::TradingCalendar;
        let half_day = calendar
            .schedule_for(chrono::NaiveDate::from_ymd_opt(2024, 11, 29).unwrap())
            .unwrap();
        assert!(half_day.session().unwrap().early_close);
    }

    #[test]
    fn test_from_file_and_calendar() {
        let mut overrides = NamedTempFile::new().unwrap();
        writeln!(overrides, "[[closures]]\ndate = \"2024-01-03\"\nreason = \"storm\"").unwrap();

        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[database]\npassword = \"pw\"\n[session]\ncalendar_overrides = {:?}",
            overrides.path().to_str().unwrap()
        )
        .unwrap();

        let config = AppConfig::from_toml(file.path()).unwrap();
        let calendar = config.session.build_calendar().unwrap();

        use crate::calendar::TradingCalendar;
        let closed = calendar
            .schedule_for(chrono::NaiveDate::from_ymd_opt(2024, 1, 3).unwrap())
            .unwrap();
        assert!(!closed.is_trading_day());
    }

    #[test]
    fn test_unknown_calendar_is_unavailable() {
        let config = AppConfig::from_toml_str("[session]\ncalendar = \"XTKS\"", Some("pw".to_string())).unwrap();
        assert!(matches!(config.session.build_calendar(), Err(CalendarError::Unavailable(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            AppConfig::from_toml("/nonexistent/collector.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
