use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database connection error: {0}")]
    Connection(#[from] tokio_postgres::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Database configuration error: {0}")]
    Config(String),

    #[error("Database operation timeout: {0}")]
    Timeout(&'static str),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Configuration problems cannot heal between ticks; everything else can
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, StoreError::Config(_))
    }
}
