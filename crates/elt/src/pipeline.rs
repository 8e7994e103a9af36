//! Extract-and-load steps over a [`Warehouse`].

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use elt_core::{
    DateRange, EltError, Frequency, ReferenceDataProvider, Result, SeriesDataProvider, Symbol,
    Warehouse,
};
use elt_fred::{TREASURY_SERIES, pivot_curve};
use elt_store::ClassificationTables;

use crate::extractor::PriceExtractor;

/// Rows written by [`Pipeline::load_classification`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassificationCounts {
    /// SIC lookup rows.
    pub sic_codes: usize,
    /// NAICS lookup rows.
    pub naics_codes: usize,
    /// Crosswalk rows.
    pub sic_to_naics: usize,
}

/// Wires providers to a warehouse.
///
/// Each `load_*` step extracts from its provider and upserts into the
/// warehouse. Steps whose provider is not configured fail with
/// [`EltError::ProviderNotConfigured`].
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use elt::{Pipeline, PolygonProvider, SqliteWarehouse, Symbol};
///
/// let pipeline = Pipeline::new(Arc::new(SqliteWarehouse::open("warehouse.db")?))
///     .with_reference(Arc::new(PolygonProvider::new("api_key")));
/// let loaded = pipeline.load_ticker_details(&[Symbol::new("AAPL")]).await?;
/// ```
#[derive(Clone)]
pub struct Pipeline {
    warehouse: Arc<dyn Warehouse>,
    reference: Option<Arc<dyn ReferenceDataProvider>>,
    series: Option<Arc<dyn SeriesDataProvider>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("reference", &self.reference.as_ref().map(|p| p.name().to_string()))
            .field("series", &self.series.as_ref().map(|p| p.name().to_string()))
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a pipeline loading into `warehouse`.
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self {
            warehouse,
            reference: None,
            series: None,
        }
    }

    /// Set the company details provider.
    #[must_use]
    pub fn with_reference(mut self, provider: Arc<dyn ReferenceDataProvider>) -> Self {
        self.reference = Some(provider);
        self
    }

    /// Set the economic series provider.
    #[must_use]
    pub fn with_series(mut self, provider: Arc<dyn SeriesDataProvider>) -> Self {
        self.series = Some(provider);
        self
    }

    /// Target warehouse.
    #[must_use]
    pub fn warehouse(&self) -> &Arc<dyn Warehouse> {
        &self.warehouse
    }

    /// Fetch and upsert company details for each ticker.
    ///
    /// A ticker whose lookup fails is logged and skipped. Returns the number
    /// of companies written.
    pub async fn load_ticker_details(&self, symbols: &[Symbol]) -> Result<usize> {
        let provider = self.reference.as_ref().ok_or_else(|| {
            EltError::ProviderNotConfigured("No reference data provider configured".to_string())
        })?;

        let mut details = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            debug!(provider = provider.name(), symbol = %symbol, "Fetching company details");
            match provider.company_details(symbol).await {
                Ok(company) => details.push(company),
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        symbol = %symbol,
                        error = %e,
                        "Skipping ticker"
                    );
                }
            }
        }

        let written = self.warehouse.upsert_company_details(&details).await?;
        info!(requested = symbols.len(), written, "Loaded company details");
        Ok(written)
    }

    /// Run the checkpointed extraction and upsert every ticker's bars.
    ///
    /// Returns the number of bars written.
    ///
    /// # Errors
    /// Propagates extraction interruption; nothing is written in that case and
    /// the checkpoint keeps the progress for the next run.
    pub async fn load_prices(
        &self,
        extractor: &PriceExtractor,
        symbols: &[Symbol],
        range: DateRange,
        location: &Path,
    ) -> Result<usize> {
        let extracted = extractor.extract_range(symbols, range, location).await?;

        let mut written = 0;
        for (symbol, bars) in &extracted {
            written += self.warehouse.upsert_price_bars(symbol, bars).await?;
        }

        info!(tickers = extracted.len(), bars = written, "Loaded price bars");
        Ok(written)
    }

    /// Fetch every treasury tenor and upsert the pivoted curve.
    ///
    /// Returns the number of curve rows written.
    pub async fn load_treasury_curve(&self, range: Option<DateRange>) -> Result<usize> {
        let provider = self.series.as_ref().ok_or_else(|| {
            EltError::ProviderNotConfigured("No series data provider configured".to_string())
        })?;

        let mut series = Vec::with_capacity(TREASURY_SERIES.len());
        for series_id in TREASURY_SERIES {
            let observations = provider
                .series_observations(series_id, range, Frequency::Daily)
                .await?;
            debug!(series_id, observations = observations.len(), "Fetched series");
            series.push((*series_id, observations));
        }

        let curve = pivot_curve(&series);
        let written = self.warehouse.upsert_treasury_curve(&curve).await?;
        info!(rows = written, "Loaded treasury curve");
        Ok(written)
    }

    /// Replace the SIC, NAICS and crosswalk lookup tables.
    pub async fn load_classification(
        &self,
        tables: &ClassificationTables,
    ) -> Result<ClassificationCounts> {
        let counts = ClassificationCounts {
            sic_codes: self.warehouse.replace_sic_codes(&tables.sic_codes).await?,
            naics_codes: self.warehouse.replace_naics_codes(&tables.naics_codes).await?,
            sic_to_naics: self
                .warehouse
                .replace_sic_to_naics(&tables.sic_to_naics)
                .await?,
        };
        info!(
            sic = counts.sic_codes,
            naics = counts.naics_codes,
            crosswalk = counts.sic_to_naics,
            "Loaded classification tables"
        );
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone, Utc};
    use elt_core::{
        CompanyDetails, DataProvider, NaicsCode, Observation, PriceBar, PriceDataProvider,
        SicCode, SicNaicsMapping,
    };
    use elt_store::{InMemoryCheckpointStore, InMemoryWarehouse};

    #[derive(Debug)]
    struct StubProvider;

    impl DataProvider for StubProvider {
        fn name(&self) -> &str {
            "Stub"
        }

        fn description(&self) -> &str {
            "Canned reference, price and series data"
        }
    }

    #[async_trait]
    impl ReferenceDataProvider for StubProvider {
        async fn company_details(&self, symbol: &Symbol) -> Result<CompanyDetails> {
            if symbol.as_str() == "GONE" {
                return Err(EltError::SymbolNotFound(symbol.to_string()));
            }
            Ok(CompanyDetails::new(symbol.clone(), format!("{symbol} Inc.")).with_sic_code(3571))
        }
    }

    #[async_trait]
    impl PriceDataProvider for StubProvider {
        async fn fetch_bars(
            &self,
            _symbol: &Symbol,
            _range: DateRange,
            _frequency: Frequency,
        ) -> Result<Vec<PriceBar>> {
            let day = |d| Utc.with_ymd_and_hms(2025, 1, d, 5, 0, 0).unwrap();
            Ok(vec![
                PriceBar::new(day(2), 1.0, 2.0, 0.5, 1.5, 100.0),
                PriceBar::new(day(3), 1.5, 2.5, 1.0, 2.0, 120.0),
            ])
        }
    }

    #[async_trait]
    impl SeriesDataProvider for StubProvider {
        async fn series_observations(
            &self,
            series_id: &str,
            _range: Option<DateRange>,
            _frequency: Frequency,
        ) -> Result<Vec<Observation>> {
            let date = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
            let value = if series_id == "DGS30" { None } else { Some(4.5) };
            Ok(vec![Observation { date, value }])
        }
    }

    #[tokio::test]
    async fn test_load_ticker_details_skips_failures() {
        let warehouse = Arc::new(InMemoryWarehouse::new());
        let pipeline = Pipeline::new(warehouse.clone()).with_reference(Arc::new(StubProvider));

        let written = pipeline
            .load_ticker_details(&[Symbol::new("AAPL"), Symbol::new("GONE")])
            .await
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(
            warehouse.company(&Symbol::new("AAPL")).await.unwrap().name,
            "AAPL Inc."
        );
    }

    #[tokio::test]
    async fn test_missing_provider() {
        let pipeline = Pipeline::new(Arc::new(InMemoryWarehouse::new()));
        assert!(matches!(
            pipeline.load_ticker_details(&[Symbol::new("AAPL")]).await,
            Err(EltError::ProviderNotConfigured(_))
        ));
        assert!(matches!(
            pipeline.load_treasury_curve(None).await,
            Err(EltError::ProviderNotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_load_prices() {
        let warehouse = Arc::new(InMemoryWarehouse::new());
        let pipeline = Pipeline::new(warehouse.clone());
        let extractor = PriceExtractor::new(
            Arc::new(StubProvider),
            Arc::new(InMemoryCheckpointStore::new()),
        );
        let range = DateRange::parse("2025-01-01", "2025-01-31").unwrap();

        let written = pipeline
            .load_prices(
                &extractor,
                &[Symbol::new("AAPL"), Symbol::new("MSFT")],
                range,
                Path::new("prices.json"),
            )
            .await
            .unwrap();

        assert_eq!(written, 4);
        assert_eq!(warehouse.price_bars(&Symbol::new("MSFT")).await.len(), 2);
    }

    #[tokio::test]
    async fn test_load_treasury_curve() {
        let warehouse = Arc::new(InMemoryWarehouse::new());
        let pipeline = Pipeline::new(warehouse.clone()).with_series(Arc::new(StubProvider));

        assert_eq!(pipeline.load_treasury_curve(None).await.unwrap(), 1);
        let curve = warehouse.treasury_curve().await;
        assert_eq!(curve[0].dgs1mo, Some(4.5));
        assert_eq!(curve[0].dgs30, None);
    }

    #[tokio::test]
    async fn test_load_classification_then_universe() {
        let warehouse = Arc::new(InMemoryWarehouse::new());
        let pipeline = Pipeline::new(warehouse.clone()).with_reference(Arc::new(StubProvider));
        let tables = ClassificationTables {
            sic_codes: vec![SicCode {
                code: 3571,
                office: "Office of Technology".to_string(),
                industry: "ELECTRONIC COMPUTERS".to_string(),
            }],
            naics_codes: vec![NaicsCode {
                code: 334111,
                description: "Electronic Computer Manufacturing".to_string(),
            }],
            sic_to_naics: vec![SicNaicsMapping {
                sic_code: 3571,
                sic_description: "Computers".to_string(),
                naics_code: 334111,
                naics_description: "Computer Mfg".to_string(),
            }],
        };

        let counts = pipeline.load_classification(&tables).await.unwrap();
        assert_eq!(
            counts,
            ClassificationCounts { sic_codes: 1, naics_codes: 1, sic_to_naics: 1 }
        );

        pipeline.load_ticker_details(&[Symbol::new("AAPL")]).await.unwrap();
        assert_eq!(
            warehouse.classified_tickers().await.unwrap(),
            vec![Symbol::new("AAPL")]
        );
    }
}
