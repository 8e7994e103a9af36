//! Warehouse trait for the load step.
//!
//! This module defines the [`Warehouse`] trait, the destination the pipeline
//! upserts extracted records into.

use async_trait::async_trait;

use crate::{
    error::Result,
    types::{CompanyDetails, NaicsCode, PriceBar, SicCode, SicNaicsMapping, Symbol, TreasuryCurvePoint},
};

/// Destination store for extracted records.
///
/// Upserts are keyed the way the analytical tables are: company details by
/// ticker, price bars by ticker and bar date, curve points by date.
/// Classification tables are lookup tables and are replaced wholesale.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Inserts or updates company details.
    ///
    /// Returns the number of rows written.
    async fn upsert_company_details(&self, details: &[CompanyDetails]) -> Result<usize>;

    /// Inserts or updates price bars for a symbol.
    ///
    /// Returns the number of rows written.
    async fn upsert_price_bars(&self, symbol: &Symbol, bars: &[PriceBar]) -> Result<usize>;

    /// Inserts or updates treasury curve rows.
    ///
    /// Returns the number of rows written.
    async fn upsert_treasury_curve(&self, points: &[TreasuryCurvePoint]) -> Result<usize>;

    /// Replaces the SIC lookup table. Duplicate codes keep the first row.
    async fn replace_sic_codes(&self, codes: &[SicCode]) -> Result<usize>;

    /// Replaces the NAICS lookup table. Duplicate codes keep the first row.
    async fn replace_naics_codes(&self, codes: &[NaicsCode]) -> Result<usize>;

    /// Replaces the SIC to NAICS crosswalk. Duplicate pairs keep the first row.
    async fn replace_sic_to_naics(&self, mappings: &[SicNaicsMapping]) -> Result<usize>;

    /// Tickers of companies whose SIC code appears in the SIC lookup table.
    ///
    /// This is the universe the price extraction runs over by default.
    async fn classified_tickers(&self) -> Result<Vec<Symbol>>;
}
