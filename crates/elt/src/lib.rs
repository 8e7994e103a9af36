#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/elt/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Financial reference-data ELT.
//!
//! # Features
//!
//! - `sqlite` - SQLite warehouse (default)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use elt::{EltConfig, JsonFileCheckpointStore, Pipeline, PolygonProvider, PriceExtractor};
//! use elt::{DateRange, SqliteWarehouse, Symbol};
//!
//! #[tokio::main]
//! async fn main() -> elt::Result<()> {
//!     let config = EltConfig::from_env();
//!     let pipeline = Pipeline::new(Arc::new(SqliteWarehouse::open(config.db_path()?)?));
//!     let extractor = PriceExtractor::new(
//!         Arc::new(PolygonProvider::new(config.polygon_api_key()?)),
//!         Arc::new(JsonFileCheckpointStore::new()),
//!     )
//!     .with_config(config.extractor);
//!
//!     let range = DateRange::parse("2025-01-01", "2025-06-30")?;
//!     let tickers = [Symbol::new("AAPL"), Symbol::new("MSFT")];
//!     pipeline
//!         .load_prices(&extractor, &tickers, range, &config.checkpoint_path)
//!         .await?;
//!     Ok(())
//! }
//! ```

// Core types and traits
pub use elt_core::*;

// Storage
#[cfg(feature = "sqlite")]
pub use elt_store::SqliteWarehouse;
pub use elt_store::{
    ClassificationTables, InMemoryCheckpointStore, InMemoryWarehouse, JsonFileCheckpointStore,
    classification,
};

// Providers
pub use elt_alphavantage::{FundamentalsDownloader, Statement, StatementSelection, report_dates};
pub use elt_fred::{FredProvider, TREASURY_SERIES, curve_frame};
pub use elt_polygon::PolygonProvider;

pub use tokio_util::sync::CancellationToken;

mod config;
pub use config::{DEFAULT_CHECKPOINT_PATH, DEFAULT_FUNDAMENTALS_PATH, ENV_FILES, EltConfig};

mod extractor;
pub use extractor::{
    DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY,
    ExtractionResult, ExtractorConfig, PriceExtractor,
};

mod pipeline;
pub use pipeline::{ClassificationCounts, Pipeline};
