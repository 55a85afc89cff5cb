use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts};
use postgres_types::ToSql;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio_postgres::NoTls;
use tracing::{debug, info};

use crate::common::constants::{
    DEFAULT_TABLE_NAME, STORE_ACQUIRE_CONTEXT, STORE_COMPLETENESS_CONTEXT, STORE_UPSERT_CONTEXT,
};
use crate::session::FinalMinuteWindow;
use crate::store::{Observation, ObservationStore, StoreConnector, StoreError};

/// PostgreSQL configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_connections: usize,
    pub connection_timeout_seconds: u64,
    pub statement_timeout_seconds: u64,
    pub table: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "market_data".to_string(),
            username: "postgres".to_string(),
            password: String::new(),
            max_connections: 4,
            connection_timeout_seconds: 10,
            statement_timeout_seconds: 30,
            table: DEFAULT_TABLE_NAME.to_string(),
        }
    }
}

/// Plain SQL identifier: a letter or underscore followed by letters, digits or underscores
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// SQL statements for one observation table
#[derive(Debug, Clone)]
struct Statements {
    create_table: String,
    insert: String,
    present_in_window: String,
}

impl Statements {
    fn for_table(table: &str) -> Self {
        Self {
            create_table: format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    symbol TEXT NOT NULL,
                    minute TIMESTAMPTZ NOT NULL,
                    open DOUBLE PRECISION NOT NULL,
                    high DOUBLE PRECISION NOT NULL,
                    low DOUBLE PRECISION NOT NULL,
                    close DOUBLE PRECISION NOT NULL,
                    volume BIGINT NOT NULL,
                    PRIMARY KEY (symbol, minute)
                )
                "#
            ),
            insert: format!(
                r#"
                INSERT INTO {table} (symbol, minute, open, high, low, close, volume)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (symbol, minute) DO NOTHING
                "#
            ),
            present_in_window: format!(
                "SELECT DISTINCT symbol FROM {table} WHERE minute >= $1 AND minute < $2"
            ),
        }
    }
}

async fn bounded<T, F>(limit: Duration, context: &'static str, operation: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| StoreError::Timeout(context))?
}

/// Pooled PostgreSQL connector for the observation table
pub struct PostgresConnector {
    pool: Pool,
    statements: Arc<Statements>,
    statement_timeout: Duration,
    schema_ready: AtomicBool,
    schema_lock: Mutex<()>,
}

impl PostgresConnector {
    /// Build the pool; no connection is opened until the first acquire
    pub fn new(config: &PostgresConfig) -> Result<Self, StoreError> {
        if !is_valid_identifier(&config.table) {
            return Err(StoreError::Config(format!("Invalid table name: {:?}", config.table)));
        }

        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            username = %config.username,
            table = %config.table,
            "Initializing PostgreSQL connection pool"
        );

        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.dbname = Some(config.database.clone());
        cfg.user = Some(config.username.clone());
        cfg.password = Some(config.password.clone());
        cfg.application_name = Some("market_collector".to_string());
        cfg.ssl_mode = Some(deadpool_postgres::SslMode::Disable);
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let connect_timeout = Duration::from_secs(config.connection_timeout_seconds);
        cfg.connect_timeout = Some(connect_timeout);
        cfg.pool = Some(PoolConfig {
            max_size: config.max_connections.max(1),
            timeouts: Timeouts {
                wait: Some(connect_timeout),
                create: Some(connect_timeout),
                recycle: Some(connect_timeout),
            },
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Config(format!("Failed to create connection pool: {}", e)))?;

        Ok(Self {
            pool,
            statements: Arc::new(Statements::for_table(&config.table)),
            statement_timeout: Duration::from_secs(config.statement_timeout_seconds),
            schema_ready: AtomicBool::new(false),
            schema_lock: Mutex::new(()),
        })
    }

    async fn ensure_schema(&self, client: &Object) -> Result<(), StoreError> {
        if self.schema_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let _guard = self.schema_lock.lock().await;
        if self.schema_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        bounded(self.statement_timeout, STORE_ACQUIRE_CONTEXT, async {
            client.batch_execute(&self.statements.create_table).await?;
            Ok(())
        })
        .await?;

        self.schema_ready.store(true, Ordering::Release);
        info!("✅ Observation table schema ensured");
        Ok(())
    }
}

#[async_trait]
impl StoreConnector for PostgresConnector {
    type Session = PostgresSession;

    async fn acquire(&self) -> Result<PostgresSession, StoreError> {
        // pool.get() is bounded by the pool's wait/create timeouts
        let client = self.pool.get().await?;
        self.ensure_schema(&client).await?;

        let status = self.pool.status();
        debug!(size = status.size, available = status.available, "Acquired store connection");

        Ok(PostgresSession {
            client,
            statements: Arc::clone(&self.statements),
            statement_timeout: self.statement_timeout,
        })
    }
}

/// One pooled connection; returned to the pool when dropped
pub struct PostgresSession {
    client: Object,
    statements: Arc<Statements>,
    statement_timeout: Duration,
}

#[async_trait]
impl ObservationStore for PostgresSession {
    async fn upsert_batch(&mut self, rows: &[Observation]) -> Result<u64, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let statements = Arc::clone(&self.statements);
        let client = &mut self.client;
        let inserted = bounded(self.statement_timeout, STORE_UPSERT_CONTEXT, async move {
            let transaction = client.transaction().await?;
            let stmt = transaction.prepare(&statements.insert).await?;

            let mut rows_affected = 0;
            for row in rows {
                let params: [&(dyn ToSql + Sync); 7] = [
                    &row.symbol,
                    &row.minute,
                    &row.open,
                    &row.high,
                    &row.low,
                    &row.close,
                    &row.volume,
                ];
                rows_affected += transaction.execute(&stmt, &params).await?;
            }

            transaction.commit().await?;
            Ok(rows_affected)
        })
        .await?;

        debug!("Batch stored {} rows (inserted: {})", rows.len(), inserted);
        Ok(inserted)
    }

    async fn symbols_present_in(&mut self, window: &FinalMinuteWindow) -> Result<HashSet<String>, StoreError> {
        let client = &self.client;
        let statements = &self.statements;
        bounded(self.statement_timeout, STORE_COMPLETENESS_CONTEXT, async move {
            let rows = client
                .query(statements.present_in_window.as_str(), &[&window.start, &window.end])
                .await?;
            Ok(rows.iter().map(|row| row.get::<_, String>("symbol")).collect())
        })
        .await
    }
}
