#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/elt/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Polygon.io data provider.
//!
//! # Usage
//!
//! ```rust,ignore
//! use elt_polygon::PolygonProvider;
//! use elt_core::{DateRange, Frequency, PriceDataProvider, ReferenceDataProvider, Symbol};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = PolygonProvider::new("your_api_key");
//!     let symbol = Symbol::new("AAPL");
//!
//!     let details = provider.company_details(&symbol).await?;
//!     let range = DateRange::parse("2025-01-01", "2025-10-28")?;
//!     let bars = provider.fetch_bars(&symbol, range, Frequency::Daily).await?;
//!
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use elt_core::{
    CompanyDetails, DataProvider, DateRange, EltError, Frequency, PriceBar, PriceDataProvider,
    ReferenceDataProvider, Result, Symbol,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::fmt;
use tracing::debug;

/// Base URL for the Polygon REST API.
const POLYGON_BASE_URL: &str = "https://api.polygon.io";

/// Maximum number of aggregates Polygon returns in one response.
const AGGREGATE_LIMIT: u32 = 50_000;

/// Polygon.io data provider.
///
/// Provides access to:
/// - Ticker details (company reference data)
/// - Aggregate bars for a ticker over a date range
#[derive(Clone)]
pub struct PolygonProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl fmt::Debug for PolygonProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolygonProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl PolygonProvider {
    /// Create a new Polygon provider with the given API key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_client(Client::new(), api_key)
    }

    /// Create a new Polygon provider with a custom HTTP client.
    #[must_use]
    pub fn with_client(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: POLYGON_BASE_URL.to_string(),
        }
    }

    /// Point the provider at a different host (proxies, test servers).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build a URL with the API key appended.
    fn url(&self, endpoint: &str) -> String {
        let sep = if endpoint.contains('?') { '&' } else { '?' };
        format!("{}/{endpoint}{sep}apiKey={}", self.base_url, self.api_key)
    }

    /// Endpoint for aggregate bars of a symbol.
    fn aggregates_endpoint(symbol: &Symbol, range: DateRange, frequency: Frequency) -> String {
        format!(
            "v2/aggs/ticker/{}/range/1/{}/{}/{}?adjusted=true&sort=asc&limit={AGGREGATE_LIMIT}",
            symbol.as_str(),
            frequency.polygon_timespan(),
            range.start,
            range.end,
        )
    }

    /// Make a GET request and return the response body.
    async fn get(&self, endpoint: &str, symbol: &Symbol) -> Result<String> {
        let url = self.url(endpoint);
        debug!("Polygon request: {}", endpoint);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EltError::Network(e.to_string()))?;

        let status = response.status();
        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(EltError::RateLimited {
                    provider: "Polygon".to_string(),
                    retry_after: None,
                });
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(EltError::AuthenticationFailed("Polygon".to_string()));
            }
            StatusCode::NOT_FOUND => {
                return Err(EltError::SymbolNotFound(symbol.to_string()));
            }
            _ => {}
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EltError::Network(format!("HTTP {status}: {text}")));
        }

        response
            .text()
            .await
            .map_err(|e| EltError::Network(e.to_string()))
    }
}

impl DataProvider for PolygonProvider {
    fn name(&self) -> &str {
        "Polygon"
    }

    fn description(&self) -> &str {
        "Polygon.io - Stock market aggregates and reference data"
    }
}

#[async_trait]
impl PriceDataProvider for PolygonProvider {
    async fn fetch_bars(
        &self,
        symbol: &Symbol,
        range: DateRange,
        frequency: Frequency,
    ) -> Result<Vec<PriceBar>> {
        let endpoint = Self::aggregates_endpoint(symbol, range, frequency);
        let text = self.get(&endpoint, symbol).await?;
        let bars = parse_aggregates(&text)?;
        debug!(symbol = %symbol, bars = bars.len(), "Fetched Polygon aggregates");
        Ok(bars)
    }
}

#[async_trait]
impl ReferenceDataProvider for PolygonProvider {
    async fn company_details(&self, symbol: &Symbol) -> Result<CompanyDetails> {
        let endpoint = format!("v3/reference/tickers/{}", symbol.as_str());
        let text = self.get(&endpoint, symbol).await?;
        parse_ticker_details(symbol, &text)
    }
}

/// Decode an aggregates response into bars.
///
/// A response without `results` means no bars in the range and yields an
/// empty vector.
fn parse_aggregates(text: &str) -> Result<Vec<PriceBar>> {
    let response: PolygonAggregatesResponse =
        serde_json::from_str(text).map_err(|e| EltError::Parse(format!("{e}: {text}")))?;
    check_status(&response.status, response.error.as_deref())?;

    response
        .results
        .unwrap_or_default()
        .into_iter()
        .map(|agg| {
            let timestamp = DateTime::from_timestamp_millis(agg.t)
                .ok_or_else(|| EltError::Parse(format!("Invalid aggregate timestamp: {}", agg.t)))?;
            let mut bar = PriceBar::new(timestamp, agg.o, agg.h, agg.l, agg.c, agg.v);
            if let Some(vw) = agg.vw {
                bar = bar.with_vwap(vw);
            }
            if let Some(n) = agg.n {
                bar = bar.with_transactions(n);
            }
            Ok(bar)
        })
        .collect()
}

/// Decode a ticker details response.
fn parse_ticker_details(symbol: &Symbol, text: &str) -> Result<CompanyDetails> {
    let response: PolygonTickerDetailsResponse =
        serde_json::from_str(text).map_err(|e| EltError::Parse(format!("{e}: {text}")))?;
    check_status(&response.status, response.error.as_deref())?;

    let details = response
        .results
        .ok_or_else(|| EltError::SymbolNotFound(symbol.to_string()))?;

    let mut company = CompanyDetails::new(symbol.clone(), details.name);
    company.market_cap = details.market_cap;
    company.active = details.active;
    company.composite_figi = details.composite_figi;
    company.base_currency = details.currency_name;
    company.list_date = details
        .list_date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
    company.primary_exchange = details.primary_exchange;
    company.shares_outstanding = details.share_class_shares_outstanding.map(|s| s as i64);
    company.total_employees = details.total_employees.map(|e| e as i64);
    company.sic_code = details.sic_code.as_deref().and_then(|c| c.trim().parse().ok());

    Ok(company)
}

/// Map Polygon's in-body status to an error.
fn check_status(status: &str, error: Option<&str>) -> Result<()> {
    match status {
        "" | "OK" | "DELAYED" => Ok(()),
        "NOT_AUTHORIZED" => Err(EltError::AuthenticationFailed("Polygon".to_string())),
        "NOT_FOUND" => Err(EltError::SymbolNotFound(
            error.unwrap_or("unknown ticker").to_string(),
        )),
        other => Err(EltError::Network(format!(
            "Polygon status {other}: {}",
            error.unwrap_or("no error message")
        ))),
    }
}

// ============================================================================
// Polygon API Response Types
// ============================================================================

/// Polygon aggregates response.
#[derive(Debug, Clone, Deserialize)]
struct PolygonAggregatesResponse {
    #[serde(default)]
    status: String,
    #[serde(default, alias = "message")]
    error: Option<String>,
    results: Option<Vec<PolygonAggregate>>,
}

/// A single aggregate bar.
#[derive(Debug, Clone, Deserialize)]
struct PolygonAggregate {
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    #[serde(default)]
    v: f64,
    vw: Option<f64>,
    n: Option<u64>,
}

/// Polygon ticker details response.
#[derive(Debug, Clone, Deserialize)]
struct PolygonTickerDetailsResponse {
    #[serde(default)]
    status: String,
    #[serde(default, alias = "message")]
    error: Option<String>,
    results: Option<PolygonTickerDetails>,
}

/// Ticker details payload.
#[derive(Debug, Clone, Deserialize)]
struct PolygonTickerDetails {
    #[serde(default)]
    name: String,
    market_cap: Option<f64>,
    active: Option<bool>,
    composite_figi: Option<String>,
    currency_name: Option<String>,
    list_date: Option<String>,
    primary_exchange: Option<String>,
    share_class_shares_outstanding: Option<f64>,
    total_employees: Option<f64>,
    sic_code: Option<String>,
}
