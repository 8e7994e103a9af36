#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/elt/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for the ELT pipeline.
//!
//! - [`PriceDataProvider`](provider::PriceDataProvider) - Aggregate price bars
//! - [`ReferenceDataProvider`](provider::ReferenceDataProvider) - Company details
//! - [`SeriesDataProvider`](provider::SeriesDataProvider) - Economic time series
//! - [`CheckpointStore`](checkpoint::CheckpointStore) - Durable extraction progress
//! - [`Warehouse`](warehouse::Warehouse) - Destination of the load step

/// Checkpoint record and store trait for resumable extraction.
pub mod checkpoint;
/// Error types for pipeline operations.
pub mod error;
/// Data frequency definitions.
pub mod frequency;
/// Provider traits for fetching upstream data.
pub mod provider;
/// Core data types (Symbol, PriceBar, CompanyDetails, etc.).
pub mod types;
/// Warehouse trait for the load step.
pub mod warehouse;

// Re-export commonly used items at crate root
pub use checkpoint::{CheckpointRecord, CheckpointStore};
pub use error::{EltError, Result};
pub use frequency::Frequency;
pub use provider::{DataProvider, PriceDataProvider, ReferenceDataProvider, SeriesDataProvider};
pub use types::{
    CompanyDetails, DateRange, NaicsCode, Observation, PriceBar, SicCode, SicNaicsMapping, Symbol,
    TreasuryCurvePoint,
};
pub use warehouse::Warehouse;
