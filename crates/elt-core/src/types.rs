//! Core data types for the pipeline.
//!
//! Upstream responses are decoded into these typed records at the API
//! boundary so that checkpointing and loading never see raw payloads:
//!
//! - [`Symbol`] - Ticker symbol, the unit of extraction work
//! - [`DateRange`] - Inclusive calendar date range
//! - [`PriceBar`] - Aggregate (OHLCV) price bar
//! - [`CompanyDetails`] - Company reference details
//! - [`Observation`] / [`TreasuryCurvePoint`] - Economic series data
//! - [`SicCode`], [`NaicsCode`], [`SicNaicsMapping`] - Industry classification tables

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EltError, Result};

/// A trading symbol/ticker.
///
/// Symbols are automatically uppercased on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Creates a new symbol from a string, converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// An inclusive range of calendar dates.
///
/// Only ordering is validated here. Upstream limits on the span (Polygon
/// rejects ranges beyond its plan's history window) are left to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    /// First date of the range.
    pub start: NaiveDate,
    /// Last date of the range.
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a date range, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(EltError::InvalidParameter(format!(
                "start date {start} is after end date {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parses a range from two `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map_err(|e| EltError::InvalidParameter(format!("invalid date '{s}': {e}")))
        };
        Self::new(parse(start)?, parse(end)?)
    }

    /// Number of days between start and end.
    #[must_use]
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Aggregate price bar.
///
/// The timestamp marks the start of the aggregate window and is serialized as
/// Unix milliseconds, the representation Polygon uses on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    /// Start of the aggregate window.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Opening price.
    pub open: f64,
    /// Highest price during the period.
    pub high: f64,
    /// Lowest price during the period.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Trading volume.
    pub volume: f64,
    /// Volume-weighted average price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vwap: Option<f64>,
    /// Number of transactions in the window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactions: Option<u64>,
}

impl PriceBar {
    /// Creates a new price bar.
    #[must_use]
    pub const fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            vwap: None,
            transactions: None,
        }
    }

    /// Sets the volume-weighted average price.
    #[must_use]
    pub const fn with_vwap(mut self, vwap: f64) -> Self {
        self.vwap = Some(vwap);
        self
    }

    /// Sets the transaction count.
    #[must_use]
    pub const fn with_transactions(mut self, transactions: u64) -> Self {
        self.transactions = Some(transactions);
        self
    }

    /// Calendar date of the bar (UTC).
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Company reference details.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyDetails {
    /// Stock symbol.
    pub ticker: Symbol,
    /// Company name.
    pub name: String,
    /// Market capitalization.
    pub market_cap: Option<f64>,
    /// Whether the ticker is actively traded.
    pub active: Option<bool>,
    /// OpenFIGI composite identifier.
    pub composite_figi: Option<String>,
    /// Trading currency.
    pub base_currency: Option<String>,
    /// First listing date.
    pub list_date: Option<NaiveDate>,
    /// Primary exchange MIC.
    pub primary_exchange: Option<String>,
    /// Shares outstanding for this share class.
    pub shares_outstanding: Option<i64>,
    /// Total employees.
    pub total_employees: Option<i64>,
    /// Standard Industrial Classification code.
    pub sic_code: Option<i32>,
}

impl CompanyDetails {
    /// Creates company details with required fields.
    #[must_use]
    pub fn new(ticker: Symbol, name: impl Into<String>) -> Self {
        Self {
            ticker,
            name: name.into(),
            ..Default::default()
        }
    }

    /// Sets the SIC code.
    #[must_use]
    pub const fn with_sic_code(mut self, sic_code: i32) -> Self {
        self.sic_code = Some(sic_code);
        self
    }
}

/// A single dated observation of an economic series.
///
/// Missing values (FRED encodes them as `"."`) are `None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Observation date.
    pub date: NaiveDate,
    /// Observed value.
    pub value: Option<f64>,
}

/// One row of the constant-maturity treasury yield curve.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TreasuryCurvePoint {
    /// Observation date.
    pub date: NaiveDate,
    /// 1-month yield.
    pub dgs1mo: Option<f64>,
    /// 3-month yield.
    pub dgs3mo: Option<f64>,
    /// 6-month yield.
    pub dgs6mo: Option<f64>,
    /// 1-year yield.
    pub dgs1: Option<f64>,
    /// 2-year yield.
    pub dgs2: Option<f64>,
    /// 5-year yield.
    pub dgs5: Option<f64>,
    /// 10-year yield.
    pub dgs10: Option<f64>,
    /// 30-year yield.
    pub dgs30: Option<f64>,
}

impl TreasuryCurvePoint {
    /// Creates an empty curve row for a date.
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            ..Default::default()
        }
    }

    /// Sets the tenor identified by its FRED series id.
    ///
    /// Returns false if the series id is not a curve tenor.
    pub fn set_tenor(&mut self, series_id: &str, value: Option<f64>) -> bool {
        let slot = match series_id {
            "DGS1MO" => &mut self.dgs1mo,
            "DGS3MO" => &mut self.dgs3mo,
            "DGS6MO" => &mut self.dgs6mo,
            "DGS1" => &mut self.dgs1,
            "DGS2" => &mut self.dgs2,
            "DGS5" => &mut self.dgs5,
            "DGS10" => &mut self.dgs10,
            "DGS30" => &mut self.dgs30,
            _ => return false,
        };
        *slot = value;
        true
    }
}

/// SIC lookup row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SicCode {
    /// Four-digit SIC code.
    pub code: i32,
    /// SEC office responsible for the industry.
    pub office: String,
    /// Industry title.
    pub industry: String,
}

/// NAICS lookup row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NaicsCode {
    /// NAICS code (2 to 6 digits).
    pub code: i32,
    /// NAICS title.
    pub description: String,
}

/// SIC to NAICS crosswalk row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SicNaicsMapping {
    /// SIC code.
    pub sic_code: i32,
    /// SIC description.
    pub sic_description: String,
    /// NAICS code.
    pub naics_code: i32,
    /// NAICS description.
    pub naics_description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_symbol_normalization() {
        assert_eq!(Symbol::new(" aapl ").as_str(), "AAPL");
        assert_eq!(Symbol::from("msft"), Symbol::new("MSFT"));
        assert_eq!("nvda".parse::<Symbol>().unwrap().to_string(), "NVDA");
    }

    #[test]
    fn test_date_range_parse() {
        let range = DateRange::parse("2025-01-01", "2025-10-28").unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(range.span_days(), 300);
        assert_eq!(range.to_string(), "2025-01-01..2025-10-28");

        assert!(DateRange::parse("2025-02-01", "2025-01-01").is_err());
        assert!(DateRange::parse("01/02/2025", "2025-01-01").is_err());
    }

    #[test]
    fn test_price_bar_serializes_millis() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 2, 5, 0, 0).unwrap();
        let bar = PriceBar::new(ts, 1.0, 2.0, 0.5, 1.5, 1000.0).with_vwap(1.2);
        let json = serde_json::to_value(&bar).unwrap();
        assert_eq!(json["timestamp"], ts.timestamp_millis());
        assert!(json.get("transactions").is_none());

        let back: PriceBar = serde_json::from_value(json).unwrap();
        assert_eq!(back, bar);
        assert_eq!(back.date(), NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
    }

    #[test]
    fn test_curve_tenors() {
        let mut point = TreasuryCurvePoint::new(NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());
        assert!(point.set_tenor("DGS10", Some(4.2)));
        assert!(!point.set_tenor("DGS7", Some(4.0)));
        assert_eq!(point.dgs10, Some(4.2));
        assert_eq!(point.dgs30, None);
    }
}
