//! Provider traits for fetching upstream data.
//!
//! This module defines the core provider traits:
//!
//! - [`DataProvider`] - Base trait for all data providers
//! - [`PriceDataProvider`] - Aggregate price bars, the fetch operation of the batch extractor
//! - [`ReferenceDataProvider`] - Company reference details
//! - [`SeriesDataProvider`] - Economic time series observations

use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
    error::Result,
    frequency::Frequency,
    types::{CompanyDetails, DateRange, Observation, PriceBar, Symbol},
};

/// Base trait for all data providers.
pub trait DataProvider: Send + Sync + Debug {
    /// Returns the name of this provider (e.g., "Polygon").
    fn name(&self) -> &str;

    /// Returns a description of this provider.
    fn description(&self) -> &str;
}

/// Provider for aggregate price bars.
///
/// Every error returned from [`fetch_bars`](Self::fetch_bars) is treated as
/// retryable by the batch extractor.
#[async_trait]
pub trait PriceDataProvider: DataProvider {
    /// Fetches bars for a single symbol, ordered by timestamp.
    async fn fetch_bars(
        &self,
        symbol: &Symbol,
        range: DateRange,
        frequency: Frequency,
    ) -> Result<Vec<PriceBar>>;
}

/// Provider for company reference details.
#[async_trait]
pub trait ReferenceDataProvider: DataProvider {
    /// Fetches company details for a symbol.
    async fn company_details(&self, symbol: &Symbol) -> Result<CompanyDetails>;
}

/// Provider for economic time series.
#[async_trait]
pub trait SeriesDataProvider: DataProvider {
    /// Fetches observations of a series, optionally bounded by a date range.
    async fn series_observations(
        &self,
        series_id: &str,
        range: Option<DateRange>,
        frequency: Frequency,
    ) -> Result<Vec<Observation>>;
}
