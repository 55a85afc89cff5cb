use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::source::MarketDataProvider;
use super::types::{ProviderBatch, ProviderError, RawBar};
use crate::calendar::TradingDay;
use crate::common::constants::{
    DEFAULT_MAX_CONCURRENT_REQUESTS, DEFAULT_REQUEST_TIMEOUT_SECONDS, INTERVAL_1M, SECONDS_PER_MINUTE,
    YAHOO_BASE_URL, YAHOO_CHART_PATH, YAHOO_USER_AGENT,
};

/// Provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    pub request_timeout_seconds: u64,
    pub max_concurrent_requests: usize,
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: YAHOO_BASE_URL.to_string(),
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            user_agent: YAHOO_USER_AGENT.to_string(),
        }
    }
}

// Chart endpoint response shape
#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartApiError>,
}

#[derive(Debug, Deserialize)]
struct ChartApiError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Yahoo Finance chart API client for one-minute bars
pub struct YahooChartProvider {
    client: reqwest::Client,
    base_url: String,
    max_concurrent_requests: usize,
}

impl YahooChartProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ProviderError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_concurrent_requests: config.max_concurrent_requests.max(1),
        })
    }

    fn chart_url(&self, symbol: &str) -> String {
        format!("{}{}/{}", self.base_url, YAHOO_CHART_PATH, symbol)
    }

    fn chart_query(period1: i64, period2: i64) -> Vec<(&'static str, String)> {
        vec![
            ("interval", INTERVAL_1M.to_string()),
            ("period1", period1.to_string()),
            ("period2", period2.to_string()),
            ("includePrePost", "false".to_string()),
        ]
    }

    /// Bars for one symbol; `None` when the provider has nothing for it
    async fn fetch_symbol(&self, symbol: &str, period1: i64, period2: i64) -> Result<Option<Vec<RawBar>>, ProviderError> {
        let url = self.chart_url(symbol);
        debug!("Fetching chart from: {} ({}..{})", url, period1, period2);

        let response = self
            .client
            .get(&url)
            .query(&Self::chart_query(period1, period2))
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if status.as_u16() == 404 {
            debug!(symbol, "No chart data (404)");
            return Ok(None);
        }

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ProviderError::RateLimit(format!(
                "Rate limit exceeded for {}, retry after {} seconds",
                symbol, retry_after
            )));
        }

        if !status.is_success() {
            return Err(ProviderError::Http(format!(
                "HTTP {} for {}: {}",
                status,
                symbol,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let body = response.text().await.map_err(ProviderError::from_reqwest)?;
        parse_chart(symbol, &body)
    }
}

/// Parse a chart response body into bars
fn parse_chart(symbol: &str, body: &str) -> Result<Option<Vec<RawBar>>, ProviderError> {
    let envelope: ChartEnvelope = serde_json::from_str(body)
        .map_err(|e| ProviderError::Parse(format!("Failed to parse chart JSON for {}: {}", symbol, e)))?;

    if let Some(error) = envelope.chart.error {
        if error.code.eq_ignore_ascii_case("Not Found") {
            return Ok(None);
        }
        return Err(ProviderError::Upstream(format!(
            "{} for {}: {}",
            error.code,
            symbol,
            error.description.unwrap_or_default()
        )));
    }

    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(None);
    };
    let timestamps = match result.timestamp {
        Some(ts) if !ts.is_empty() => ts,
        _ => return Ok(None),
    };
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    let value_at = |series: &[Option<f64>], i: usize| series.get(i).copied().flatten();

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        let Some(timestamp) = DateTime::from_timestamp(*ts, 0) else {
            warn!(symbol, timestamp = ts, "Skipping bar with invalid timestamp");
            continue;
        };

        bars.push(RawBar {
            timestamp,
            open: value_at(&quote.open, i),
            high: value_at(&quote.high, i),
            low: value_at(&quote.low, i),
            close: value_at(&quote.close, i),
            volume: value_at(&quote.volume, i)
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(|v| v.round() as i64),
        });
    }

    Ok(Some(bars))
}

/// Fold per-symbol outcomes into one batch. Individual failures drop only
/// their symbol; the call fails only when every requested symbol failed.
fn assemble_batch(
    requested: usize,
    outcomes: Vec<(String, Result<Option<Vec<RawBar>>, ProviderError>)>,
) -> Result<ProviderBatch, ProviderError> {
    let mut batch = ProviderBatch::new();
    let mut failures = Vec::new();

    for (symbol, outcome) in outcomes {
        match outcome {
            Ok(Some(bars)) => {
                batch.insert(symbol, bars);
            }
            Ok(None) => debug!(symbol = %symbol, "Symbol absent from provider response"),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "⚠️ Symbol fetch failed, continuing with the rest");
                failures.push(e);
            }
        }
    }

    if requested > 0 && failures.len() == requested {
        return Err(failures.swap_remove(0));
    }

    Ok(batch)
}

#[async_trait]
impl MarketDataProvider for YahooChartProvider {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn fetch_intraday(&self, symbols: &[String], day: &TradingDay) -> Result<ProviderBatch, ProviderError> {
        let Some(session) = day.session() else {
            return Ok(ProviderBatch::new());
        };

        // period2 is exclusive; reach one minute past close to include the final bar
        let period1 = session.open.timestamp();
        let period2 = session.close.timestamp() + SECONDS_PER_MINUTE;

        let outcomes: Vec<(String, Result<Option<Vec<RawBar>>, ProviderError>)> = stream::iter(symbols.iter().cloned())
            .map(|symbol| async move {
                let outcome = self.fetch_symbol(&symbol, period1, period2).await;
                (symbol, outcome)
            })
            .buffer_unordered(self.max_concurrent_requests)
            .collect()
            .await;

        let batch = assemble_batch(symbols.len(), outcomes)?;
        let bars: usize = batch.values().map(Vec::len).sum();
        info!("✅ Fetched {} bars for {}/{} symbols on {}", bars, batch.len(), symbols.len(), day.date);
        Ok(batch)
    }
}
