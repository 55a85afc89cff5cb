use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use market_collector::config::{AppConfig, ConfigError};
use market_collector::ingestion::{CollectorError, IngestionCycle, IngestionLoop};
use market_collector::logging::{cleanup_old_logs, init_dual_logging, init_simple_logging, log_system_info};
use market_collector::postgres::PostgresConnector;
use market_collector::provider::YahooChartProvider;
use market_collector::session::{SessionClock, SystemClock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const USAGE: &str = "usage: market_collector [--once] [config.toml]";

#[derive(Debug)]
struct CliArgs {
    once: bool,
    config_path: Option<PathBuf>,
}

fn parse_args() -> Result<CliArgs, String> {
    let mut args = CliArgs {
        once: false,
        config_path: None,
    };

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--once" => args.once = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            flag if flag.starts_with('-') => return Err(format!("unknown flag {}\n{}", flag, USAGE)),
            path if args.config_path.is_none() => args.config_path = Some(PathBuf::from(path)),
            _ => return Err(USAGE.to_string()),
        }
    }
    Ok(args)
}

/// An explicit path must exist; the default path is optional
fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => AppConfig::from_toml(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => AppConfig::from_toml(DEFAULT_CONFIG_PATH),
        None => AppConfig::from_env(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(2);
        }
    };

    let config = match load_config(args.config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            return ExitCode::from(2);
        }
    };

    let _logging_guard = match init_dual_logging(&config.logging) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("❌ Failed to initialize logging system: {}", e);
            if let Err(e) = init_simple_logging(&config.logging.level_filter) {
                eprintln!("❌ Console logging unavailable: {}", e);
            }
            None
        }
    };

    if let Err(e) = cleanup_old_logs(&config.logging.log_dir, config.logging.cleanup_days) {
        warn!("⚠️ Failed to clean up old log files: {}", e);
    }
    log_system_info();

    info!(
        symbols = ?config.symbols,
        calendar = %config.session.calendar,
        market_open = %config.session.market_open,
        market_close = %config.session.market_close,
        grace_minutes = config.session.grace_period.num_minutes(),
        once = args.once,
        "Configuration loaded"
    );

    match run(&config, args.once).await {
        Ok(()) => {
            info!("🏁 Graceful shutdown completed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(source = e.source_name(), error = %e, "💥 Collector stopped on fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &AppConfig, once: bool) -> Result<(), CollectorError> {
    let calendar = config.session.build_calendar()?;
    let session_clock = Arc::new(SessionClock::new(
        Arc::new(calendar),
        config.session.grace_period,
        Arc::new(SystemClock),
    ));

    let provider = YahooChartProvider::new(&config.provider)?;
    let connector = PostgresConnector::new(&config.database)?;
    let cycle = IngestionCycle::new(Arc::new(provider), config.symbols.clone());

    let mut ingestion = IngestionLoop::new(
        session_clock,
        cycle,
        connector,
        config.schedule.sleep_policy(),
        config.schedule.error_log_throttle(),
    );

    if once {
        let report = ingestion.run_once().await?;
        info!(phase = %report.phase, action = ?report.action, "Single tick finished");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("🛑 Shutdown signal received, finishing current tick");
                signal_token.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    ingestion.run(shutdown).await?;
    Ok(())
}
