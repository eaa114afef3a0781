//! Optional price and dividend lookup by ticker symbol.
//!
//! A quote only pre-fills inputs. Lookup failures are reported to the caller,
//! which keeps its manual or default values and carries on.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const YAHOO_CHART_BASE: &str = "https://query1.finance.yahoo.com";
const USER_AGENT: &str = concat!("drip/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 10;
const PAYOUTS_PER_YEAR_ESTIMATE: f64 = 4.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketDataError {
    #[error("invalid ticker symbol {0:?}")]
    InvalidSymbol(String),
    #[error("could not fetch data for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },
}

impl MarketDataError {
    fn unavailable(symbol: &str, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    pub share_price: f64,
    pub annual_dividend: f64,
    /// Per-payout estimate, assuming quarterly distributions.
    pub dividend_per_share: f64,
}

impl Quote {
    pub fn new(symbol: impl Into<String>, share_price: f64, annual_dividend: f64) -> Self {
        Self {
            symbol: symbol.into(),
            share_price,
            annual_dividend,
            dividend_per_share: annual_dividend / PAYOUTS_PER_YEAR_ESTIMATE,
        }
    }
}

pub trait QuoteProvider: Send + Sync {
    fn lookup(&self, symbol: &str) -> impl Future<Output = Result<Quote, MarketDataError>> + Send;
}

/// Price and dividend values to use when the caller has not entered their own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prefill {
    pub share_price: f64,
    pub dividend_per_share: f64,
}

impl Default for Prefill {
    fn default() -> Self {
        Self {
            share_price: 10.0,
            dividend_per_share: 0.17,
        }
    }
}

impl Prefill {
    pub fn overridden_by(self, quote: Option<&Quote>) -> Self {
        match quote {
            Some(quote) => Self {
                share_price: quote.share_price,
                dividend_per_share: quote.dividend_per_share,
            },
            None => self,
        }
    }
}

/// Looks up `symbol`, turning any failure into "no override" plus a message the
/// caller can show next to its inputs.
pub async fn lookup_or_warn<P: QuoteProvider>(
    provider: &P,
    symbol: &str,
) -> (Option<Quote>, Option<String>) {
    match provider.lookup(symbol).await {
        Ok(quote) => (Some(quote), None),
        Err(err) => {
            warn!(symbol, error = %err, "quote lookup failed; keeping manual inputs");
            (None, Some(err.to_string()))
        }
    }
}

pub fn normalize_symbol(symbol: &str) -> Result<String, MarketDataError> {
    let trimmed = symbol.trim();
    let valid = !trimmed.is_empty()
        && trimmed.len() <= 16
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
    if !valid {
        return Err(MarketDataError::InvalidSymbol(symbol.to_string()));
    }
    Ok(trimmed.to_ascii_uppercase())
}

pub struct YahooQuotes {
    client: reqwest::Client,
    base_url: String,
}

impl Default for YahooQuotes {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooQuotes {
    pub fn new() -> Self {
        Self::with_base_url(YAHOO_CHART_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn chart_url(&self, symbol: &str) -> String {
        format!(
            "{}/v8/finance/chart/{}?range=1y&interval=1d&events=div",
            self.base_url, symbol
        )
    }
}

impl QuoteProvider for YahooQuotes {
    async fn lookup(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let symbol = normalize_symbol(symbol)?;
        let url = self.chart_url(&symbol);
        debug!(url = %url, "fetching chart data");

        let response = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MarketDataError::unavailable(&symbol, "request timed out")
                } else {
                    MarketDataError::unavailable(&symbol, e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MarketDataError::unavailable(&symbol, format!("HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| MarketDataError::unavailable(&symbol, e.to_string()))?;
        parse_chart_quote(&symbol, &body)
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    events: Option<ChartEvents>,
    #[serde(default)]
    indicators: Option<ChartIndicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChartEvents {
    #[serde(default)]
    dividends: std::collections::BTreeMap<String, DividendEvent>,
}

#[derive(Debug, Deserialize)]
struct DividendEvent {
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuoteSeries>,
}

#[derive(Debug, Deserialize)]
struct ChartQuoteSeries {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// Extracts the latest close and the trailing-year dividend total from a chart
/// response body.
fn parse_chart_quote(symbol: &str, body: &str) -> Result<Quote, MarketDataError> {
    let envelope: ChartEnvelope = serde_json::from_str(body)
        .map_err(|e| MarketDataError::unavailable(symbol, format!("malformed response: {e}")))?;

    if let Some(err) = envelope.chart.error {
        let reason = err.description.unwrap_or_else(|| "unknown error".to_string());
        return Err(MarketDataError::unavailable(symbol, reason));
    }

    let result = envelope
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| MarketDataError::unavailable(symbol, "no chart data returned"))?;

    let latest_close = result
        .indicators
        .as_ref()
        .and_then(|ind| ind.quote.first())
        .and_then(|series| series.close.iter().rev().find_map(|c| *c));
    let share_price = latest_close
        .or(result.meta.regular_market_price)
        .filter(|price| price.is_finite() && *price > 0.0)
        .ok_or_else(|| MarketDataError::unavailable(symbol, "no price available"))?;

    let annual_dividend: f64 = result
        .events
        .map(|events| events.dividends.values().map(|d| d.amount).sum())
        .unwrap_or(0.0);
    let annual_dividend = if annual_dividend.is_finite() && annual_dividend > 0.0 {
        annual_dividend
    } else {
        0.0
    };

    Ok(Quote::new(symbol, share_price, annual_dividend))
}
