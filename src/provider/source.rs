use async_trait::async_trait;

use super::types::{ProviderBatch, ProviderError};
use crate::calendar::TradingDay;

/// Upstream source of minute bars
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &'static str;

    /// Minute bars of `day`'s regular session for every symbol in one batched call.
    /// Symbols with no data yet are omitted rather than reported as errors.
    async fn fetch_intraday(&self, symbols: &[String], day: &TradingDay) -> Result<ProviderBatch, ProviderError>;
}
