#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/elt/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! FRED (Federal Reserve Economic Data) provider.
//!
//! # Example
//!
//! ```rust,ignore
//! use elt_fred::FredProvider;
//! use elt_core::DateRange;
//!
//! # async fn example() -> elt_core::Result<()> {
//! let provider = FredProvider::new("your_api_key");
//! let range = DateRange::parse("2025-01-01", "2025-10-28")?;
//! let curve = provider.treasury_curve(Some(range)).await?;
//! println!("Fetched {} curve rows", curve.len());
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use elt_core::{
    DataProvider, DateRange, EltError, Frequency, Observation, Result, SeriesDataProvider,
    TreasuryCurvePoint,
};
use polars::prelude::*;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

/// FRED series observations endpoint.
const FRED_OBSERVATIONS_URL: &str = "https://api.stlouisfed.org/fred/series/observations";

/// Maximum observations per request accepted by FRED.
const OBSERVATION_LIMIT: u32 = 100_000;

/// Constant-maturity treasury series, shortest tenor first.
pub const TREASURY_SERIES: &[&str] = &[
    "DGS1MO", "DGS3MO", "DGS6MO", "DGS1", "DGS2", "DGS5", "DGS10", "DGS30",
];

/// FRED data provider.
#[derive(Clone)]
pub struct FredProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl fmt::Debug for FredProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FredProvider")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl FredProvider {
    /// Create a new FRED provider with the given API key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_client(Client::new(), api_key)
    }

    /// Create a new FRED provider with a custom HTTP client.
    #[must_use]
    pub fn with_client(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: FRED_OBSERVATIONS_URL.to_string(),
        }
    }

    /// Query parameters for an observations request.
    fn query(
        &self,
        series_id: &str,
        range: Option<DateRange>,
        frequency: Frequency,
    ) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("series_id", series_id.to_string()),
            ("api_key", self.api_key.clone()),
            ("file_type", "json".to_string()),
            ("frequency", frequency.fred_code().to_string()),
            ("limit", OBSERVATION_LIMIT.to_string()),
        ];
        if let Some(range) = range {
            params.push(("observation_start", range.start.to_string()));
            params.push(("observation_end", range.end.to_string()));
        }
        params
    }

    /// Fetch every treasury tenor and pivot into one row per date.
    ///
    /// Rows are sorted by date; tenors missing on a date are `None`.
    pub async fn treasury_curve(&self, range: Option<DateRange>) -> Result<Vec<TreasuryCurvePoint>> {
        let mut series = Vec::with_capacity(TREASURY_SERIES.len());
        for series_id in TREASURY_SERIES {
            let observations = self
                .series_observations(series_id, range, Frequency::Daily)
                .await?;
            series.push((*series_id, observations));
        }

        let curve = pivot_curve(&series);
        info!(rows = curve.len(), "Assembled treasury curve");
        Ok(curve)
    }
}

impl DataProvider for FredProvider {
    fn name(&self) -> &str {
        "FRED"
    }

    fn description(&self) -> &str {
        "Federal Reserve Economic Data - St. Louis Fed economic time series"
    }
}

#[async_trait]
impl SeriesDataProvider for FredProvider {
    async fn series_observations(
        &self,
        series_id: &str,
        range: Option<DateRange>,
        frequency: Frequency,
    ) -> Result<Vec<Observation>> {
        debug!(series_id, "FRED request");

        let response = self
            .client
            .get(&self.base_url)
            .query(&self.query(series_id, range, frequency))
            .send()
            .await
            .map_err(|e| EltError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EltError::RateLimited {
                provider: "FRED".to_string(),
                retry_after: None,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| EltError::Network(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<FredError>(&text)
                .map(|e| e.error_message)
                .unwrap_or(text);
            return Err(EltError::Network(format!("HTTP {status}: {message}")));
        }

        parse_observations(&text)
    }
}

/// Decode an observations response. FRED encodes missing values as `"."`.
fn parse_observations(text: &str) -> Result<Vec<Observation>> {
    let response: FredObservationsResponse =
        serde_json::from_str(text).map_err(|e| EltError::Parse(format!("{e}: {text}")))?;

    response
        .observations
        .into_iter()
        .map(|obs| {
            let date = NaiveDate::parse_from_str(&obs.date, "%Y-%m-%d")
                .map_err(|e| EltError::Parse(format!("Invalid observation date {}: {e}", obs.date)))?;
            let value = match obs.value.trim() {
                "." | "" => None,
                v => Some(
                    v.parse::<f64>()
                        .map_err(|e| EltError::Parse(format!("Invalid value {v}: {e}")))?,
                ),
            };
            Ok(Observation { date, value })
        })
        .collect()
}

/// Pivot per-series observations into curve rows keyed by date.
///
/// Values from series ids outside [`TREASURY_SERIES`] are dropped.
pub fn pivot_curve(series: &[(&str, Vec<Observation>)]) -> Vec<TreasuryCurvePoint> {
    let mut rows: BTreeMap<NaiveDate, TreasuryCurvePoint> = BTreeMap::new();
    for (series_id, observations) in series {
        for obs in observations {
            rows.entry(obs.date)
                .or_insert_with(|| TreasuryCurvePoint::new(obs.date))
                .set_tenor(series_id, obs.value);
        }
    }
    rows.into_values().collect()
}

/// Convert curve rows to a wide DataFrame (`date`, `DGS1MO`, ..., `DGS30`).
pub fn curve_frame(curve: &[TreasuryCurvePoint]) -> Result<DataFrame> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    let days: Vec<i32> = curve
        .iter()
        .map(|p| (p.date - epoch).num_days() as i32)
        .collect();
    let tenor = |f: fn(&TreasuryCurvePoint) -> Option<f64>| -> Vec<Option<f64>> {
        curve.iter().map(f).collect()
    };

    let df = DataFrame::new(vec![
        Column::new("date".into(), days),
        Column::new("DGS1MO".into(), tenor(|p| p.dgs1mo)),
        Column::new("DGS3MO".into(), tenor(|p| p.dgs3mo)),
        Column::new("DGS6MO".into(), tenor(|p| p.dgs6mo)),
        Column::new("DGS1".into(), tenor(|p| p.dgs1)),
        Column::new("DGS2".into(), tenor(|p| p.dgs2)),
        Column::new("DGS5".into(), tenor(|p| p.dgs5)),
        Column::new("DGS10".into(), tenor(|p| p.dgs10)),
        Column::new("DGS30".into(), tenor(|p| p.dgs30)),
    ])
    .map_err(|e| EltError::Parse(e.to_string()))?;

    df.lazy()
        .with_column(col("date").cast(DataType::Date))
        .collect()
        .map_err(|e| EltError::Parse(e.to_string()))
}

// ============================================================================
// FRED API Response Types
// ============================================================================

/// FRED observations response.
#[derive(Debug, Clone, Deserialize)]
struct FredObservationsResponse {
    #[serde(default)]
    observations: Vec<FredObservation>,
}

/// A single FRED observation; values arrive as strings.
#[derive(Debug, Clone, Deserialize)]
struct FredObservation {
    date: String,
    value: String,
}

/// FRED error body.
#[derive(Debug, Clone, Deserialize)]
struct FredError {
    error_message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_query_params() {
        let provider = FredProvider::new("test_key");
        let range = DateRange::parse("2025-01-01", "2025-03-31").unwrap();
        let params = provider.query("DGS10", Some(range), Frequency::Daily);
        assert!(params.contains(&("series_id", "DGS10".to_string())));
        assert!(params.contains(&("frequency", "d".to_string())));
        assert!(params.contains(&("limit", "100000".to_string())));
        assert!(params.contains(&("observation_start", "2025-01-01".to_string())));
        assert!(params.contains(&("observation_end", "2025-03-31".to_string())));

        let params = provider.query("DGS10", None, Frequency::Monthly);
        assert!(!params.iter().any(|(k, _)| *k == "observation_start"));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let provider = FredProvider::new("secret_key_12345");
        let debug_str = format!("{:?}", provider);
        assert!(!debug_str.contains("secret_key_12345"));
    }

    #[test]
    fn test_parse_observations_missing_values() {
        let body = r#"{"observations": [
            {"realtime_start": "2025-01-06", "realtime_end": "2025-01-06", "date": "2025-01-01", "value": "."},
            {"realtime_start": "2025-01-06", "realtime_end": "2025-01-06", "date": "2025-01-02", "value": "4.57"}
        ]}"#;
        let observations = parse_observations(body).unwrap();
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].value, None);
        assert_eq!(observations[1].value, Some(4.57));
        assert_eq!(observations[1].date, date("2025-01-02"));
    }

    #[test]
    fn test_parse_observations_rejects_garbage() {
        let body = r#"{"observations": [{"date": "2025-01-02", "value": "n/a"}]}"#;
        assert!(matches!(parse_observations(body), Err(EltError::Parse(_))));
    }

    #[test]
    fn test_pivot_curve_aligns_dates() {
        let series = vec![
            (
                "DGS1MO",
                vec![
                    Observation { date: date("2025-01-03"), value: Some(4.4) },
                    Observation { date: date("2025-01-02"), value: Some(4.3) },
                ],
            ),
            (
                "DGS10",
                vec![Observation { date: date("2025-01-03"), value: Some(4.6) }],
            ),
        ];
        let curve = pivot_curve(&series);
        assert_eq!(curve.len(), 2);
        assert_eq!(curve[0].date, date("2025-01-02"));
        assert_eq!(curve[0].dgs1mo, Some(4.3));
        assert_eq!(curve[0].dgs10, None);
        assert_eq!(curve[1].dgs10, Some(4.6));
    }

    #[test]
    fn test_curve_frame() {
        let mut point = TreasuryCurvePoint::new(date("2025-01-02"));
        point.set_tenor("DGS2", Some(4.25));
        let df = curve_frame(&[point]).unwrap();
        assert_eq!(df.height(), 1);
        assert_eq!(df.width(), 9);
        assert_eq!(df.column("date").unwrap().dtype(), &DataType::Date);
    }
}
