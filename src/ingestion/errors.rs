use thiserror::Error;

use crate::calendar::CalendarError;
use crate::config::ConfigError;
use crate::provider::ProviderError;
use crate::store::StoreError;

/// Anything that can end a tick early
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Calendar error: {0}")]
    Calendar(#[from] CalendarError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CollectorError {
    /// No phase decision is possible without the calendar, and bad
    /// configuration does not fix itself between ticks
    pub fn is_fatal(&self) -> bool {
        match self {
            CollectorError::Calendar(_) | CollectorError::Config(_) => true,
            CollectorError::Provider(e) => !e.is_recoverable(),
            CollectorError::Store(e) => !e.is_recoverable(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }

    /// Short name of the failed dependency for log fields
    pub fn source_name(&self) -> &'static str {
        match self {
            CollectorError::Calendar(_) => "calendar",
            CollectorError::Provider(_) => "provider",
            CollectorError::Store(_) => "store",
            CollectorError::Config(_) => "config",
        }
    }
}
