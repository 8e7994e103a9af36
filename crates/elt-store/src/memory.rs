//! In-memory warehouse implementation.

use async_trait::async_trait;
use chrono::NaiveDate;
use elt_core::{
    CompanyDetails, NaicsCode, PriceBar, Result, SicCode, SicNaicsMapping, Symbol,
    TreasuryCurvePoint, Warehouse,
};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Lookup tables, keyed the way the SQL tables are.
#[derive(Debug, Default)]
struct Lookups {
    sic: BTreeMap<i32, SicCode>,
    naics: BTreeMap<i32, NaicsCode>,
    crosswalk: BTreeMap<(i32, i32), SicNaicsMapping>,
}

/// Simple in-memory warehouse for testing and development.
///
/// Tables are `RwLock`-protected ordered maps and are lost when the
/// warehouse is dropped.
#[derive(Debug, Default)]
pub struct InMemoryWarehouse {
    companies: RwLock<BTreeMap<Symbol, CompanyDetails>>,
    prices: RwLock<BTreeMap<(Symbol, NaiveDate), PriceBar>>,
    curve: RwLock<BTreeMap<NaiveDate, TreasuryCurvePoint>>,
    lookups: RwLock<Lookups>,
}

impl InMemoryWarehouse {
    /// Create a new empty warehouse.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Company details for a ticker.
    pub async fn company(&self, ticker: &Symbol) -> Option<CompanyDetails> {
        self.companies.read().await.get(ticker).cloned()
    }

    /// Stored bars for a ticker, oldest first.
    pub async fn price_bars(&self, ticker: &Symbol) -> Vec<PriceBar> {
        self.prices
            .read()
            .await
            .iter()
            .filter(|((t, _), _)| t == ticker)
            .map(|(_, bar)| bar.clone())
            .collect()
    }

    /// Stored curve rows, oldest first.
    pub async fn treasury_curve(&self) -> Vec<TreasuryCurvePoint> {
        self.curve.read().await.values().cloned().collect()
    }

    /// Row counts for the SIC, NAICS and crosswalk tables.
    pub async fn lookup_counts(&self) -> (usize, usize, usize) {
        let lookups = self.lookups.read().await;
        (lookups.sic.len(), lookups.naics.len(), lookups.crosswalk.len())
    }
}

#[async_trait]
impl Warehouse for InMemoryWarehouse {
    async fn upsert_company_details(&self, details: &[CompanyDetails]) -> Result<usize> {
        let mut companies = self.companies.write().await;
        for company in details {
            companies.insert(company.ticker.clone(), company.clone());
        }
        Ok(details.len())
    }

    #[instrument(skip(self, bars), fields(symbol = %symbol, bars = bars.len()))]
    async fn upsert_price_bars(&self, symbol: &Symbol, bars: &[PriceBar]) -> Result<usize> {
        let mut prices = self.prices.write().await;
        for bar in bars {
            prices.insert((symbol.clone(), bar.date()), bar.clone());
        }
        debug!("Stored price bars");
        Ok(bars.len())
    }

    async fn upsert_treasury_curve(&self, points: &[TreasuryCurvePoint]) -> Result<usize> {
        let mut curve = self.curve.write().await;
        for point in points {
            curve.insert(point.date, point.clone());
        }
        Ok(points.len())
    }

    async fn replace_sic_codes(&self, codes: &[SicCode]) -> Result<usize> {
        let mut lookups = self.lookups.write().await;
        lookups.sic.clear();
        for code in codes {
            lookups.sic.entry(code.code).or_insert_with(|| code.clone());
        }
        Ok(lookups.sic.len())
    }

    async fn replace_naics_codes(&self, codes: &[NaicsCode]) -> Result<usize> {
        let mut lookups = self.lookups.write().await;
        lookups.naics.clear();
        for code in codes {
            lookups.naics.entry(code.code).or_insert_with(|| code.clone());
        }
        Ok(lookups.naics.len())
    }

    async fn replace_sic_to_naics(&self, mappings: &[SicNaicsMapping]) -> Result<usize> {
        let mut lookups = self.lookups.write().await;
        lookups.crosswalk.clear();
        for mapping in mappings {
            lookups
                .crosswalk
                .entry((mapping.sic_code, mapping.naics_code))
                .or_insert_with(|| mapping.clone());
        }
        Ok(lookups.crosswalk.len())
    }

    async fn classified_tickers(&self) -> Result<Vec<Symbol>> {
        let lookups = self.lookups.read().await;
        let known: HashSet<i32> = lookups.sic.keys().copied().collect();
        Ok(self
            .companies
            .read()
            .await
            .values()
            .filter(|c| c.sic_code.is_some_and(|code| known.contains(&code)))
            .map(|c| c.ticker.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(day: u32, close: f64) -> PriceBar {
        let ts = Utc.with_ymd_and_hms(2025, 1, day, 5, 0, 0).unwrap();
        PriceBar::new(ts, close, close, close, close, 100.0)
    }

    fn sic(code: i32, industry: &str) -> SicCode {
        SicCode {
            code,
            office: "Office of Technology".to_string(),
            industry: industry.to_string(),
        }
    }

    #[tokio::test]
    async fn test_price_upsert_replaces_same_day() {
        let warehouse = InMemoryWarehouse::new();
        let symbol = Symbol::new("AAPL");

        warehouse
            .upsert_price_bars(&symbol, &[bar(2, 1.0), bar(3, 2.0)])
            .await
            .unwrap();
        warehouse.upsert_price_bars(&symbol, &[bar(3, 9.0)]).await.unwrap();

        let bars = warehouse.price_bars(&symbol).await;
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].close, 9.0);
        assert!(warehouse.price_bars(&Symbol::new("MSFT")).await.is_empty());
    }

    #[tokio::test]
    async fn test_replace_lookup_keeps_first_duplicate() {
        let warehouse = InMemoryWarehouse::new();
        warehouse
            .replace_sic_codes(&[sic(100, "Crops"), sic(200, "Livestock")])
            .await
            .unwrap();
        let stored = warehouse
            .replace_sic_codes(&[sic(3571, "Computers"), sic(3571, "Duplicate")])
            .await
            .unwrap();

        assert_eq!(stored, 1);
        let lookups = warehouse.lookups.read().await;
        assert_eq!(lookups.sic[&3571].industry, "Computers");
    }

    #[tokio::test]
    async fn test_classified_tickers() {
        let warehouse = InMemoryWarehouse::new();
        warehouse
            .upsert_company_details(&[
                CompanyDetails::new(Symbol::new("AAPL"), "Apple Inc.").with_sic_code(3571),
                CompanyDetails::new(Symbol::new("SPY"), "SPDR S&P 500"),
                CompanyDetails::new(Symbol::new("XYZ"), "Unknown").with_sic_code(9999),
            ])
            .await
            .unwrap();
        warehouse.replace_sic_codes(&[sic(3571, "Computers")]).await.unwrap();

        assert_eq!(
            warehouse.classified_tickers().await.unwrap(),
            vec![Symbol::new("AAPL")]
        );
    }
}
