use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::errors::CollectorError;
use crate::calendar::TradingDay;
use crate::common::constants::SECONDS_PER_MINUTE;
use crate::common::time_utils::truncate_to_minute;
use crate::provider::{MarketDataProvider, ProviderBatch, RawBar};
use crate::store::{Observation, ObservationStore};

/// Outcome of one fetch-and-store attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleResult {
    /// Rows received for configured symbols
    pub rows_fetched: u64,
    /// Rows newly inserted; duplicates of stored rows count as 0
    pub rows_written: u64,
    /// Received rows rejected by normalization
    pub rows_dropped: u64,
    pub symbols_with_data: Vec<String>,
    pub symbols_missing: Vec<String>,
}

/// Provider rows turned into storable observations
#[derive(Debug, Default, PartialEq)]
pub struct NormalizedBatch {
    pub observations: Vec<Observation>,
    pub rows_fetched: u64,
    pub rows_dropped: u64,
    pub symbols_with_data: Vec<String>,
    pub symbols_missing: Vec<String>,
}

fn to_observation(symbol: &str, bar: &RawBar, as_of: DateTime<Utc>) -> Option<Observation> {
    let (open, high, low, close, volume) = (bar.open?, bar.high?, bar.low?, bar.close?, bar.volume?);
    if ![open, high, low, close].iter().all(|v| v.is_finite()) || volume < 0 {
        return None;
    }

    let minute = truncate_to_minute(bar.timestamp);
    // a minute still forming at `as_of` is not final yet
    if minute + TimeDelta::seconds(SECONDS_PER_MINUTE) > as_of {
        return None;
    }

    Some(Observation {
        symbol: symbol.to_string(),
        minute,
        open,
        high,
        low,
        close,
        volume,
    })
}

/// Keep complete, closed minutes of configured symbols only
pub fn normalize_batch(batch: &ProviderBatch, symbols: &[String], as_of: DateTime<Utc>) -> NormalizedBatch {
    let mut normalized = NormalizedBatch::default();
    let configured: BTreeSet<&str> = symbols.iter().map(String::as_str).collect();

    for symbol in &configured {
        let bars = match batch.get(*symbol) {
            Some(bars) if !bars.is_empty() => bars,
            _ => {
                normalized.symbols_missing.push(symbol.to_string());
                continue;
            }
        };

        normalized.symbols_with_data.push(symbol.to_string());
        normalized.rows_fetched += bars.len() as u64;
        for bar in bars {
            match to_observation(symbol, bar, as_of) {
                Some(observation) => normalized.observations.push(observation),
                None => normalized.rows_dropped += 1,
            }
        }
    }

    let ignored: Vec<&String> = batch.keys().filter(|s| !configured.contains(s.as_str())).collect();
    if !ignored.is_empty() {
        debug!(?ignored, "Ignoring unrequested symbols in provider response");
    }

    normalized
}

/// One fetch-normalize-store pass over the configured symbols
pub struct IngestionCycle {
    provider: Arc<dyn MarketDataProvider>,
    symbols: Vec<String>,
}

impl IngestionCycle {
    pub fn new(provider: Arc<dyn MarketDataProvider>, symbols: Vec<String>) -> Self {
        Self { provider, symbols }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Fetch `day`'s bars, normalize them against `as_of` and submit all of
    /// them in a single write. Zero rows is a valid outcome.
    pub async fn run<S>(&self, store: &mut S, day: &TradingDay, as_of: DateTime<Utc>) -> Result<CycleResult, CollectorError>
    where
        S: ObservationStore + ?Sized,
    {
        let batch = self.provider.fetch_intraday(&self.symbols, day).await?;
        let normalized = normalize_batch(&batch, &self.symbols, as_of);

        if !normalized.symbols_missing.is_empty() {
            debug!(
                provider = self.provider.name(),
                missing = ?normalized.symbols_missing,
                "No data yet for some symbols"
            );
        }
        if normalized.rows_dropped > 0 {
            warn!(
                dropped = normalized.rows_dropped,
                fetched = normalized.rows_fetched,
                "Dropped incomplete or still-forming rows"
            );
        }

        let rows_written = if normalized.observations.is_empty() {
            0
        } else {
            store.upsert_batch(&normalized.observations).await?
        };

        let result = CycleResult {
            rows_fetched: normalized.rows_fetched,
            rows_written,
            rows_dropped: normalized.rows_dropped,
            symbols_with_data: normalized.symbols_with_data,
            symbols_missing: normalized.symbols_missing,
        };

        if result.rows_fetched == 0 {
            info!(date = %day.date, provider = self.provider.name(), "📭 Provider returned no rows");
        } else {
            info!(
                date = %day.date,
                fetched = result.rows_fetched,
                written = result.rows_written,
                symbols = result.symbols_with_data.len(),
                "📊 Ingestion cycle complete"
            );
        }

        Ok(result)
    }
}
