#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/elt/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Storage implementations for the ELT pipeline.
//!
//! This crate provides implementations of the [`CheckpointStore`] and
//! [`Warehouse`] traits from `elt-core`:
//!
//! - [`JsonFileCheckpointStore`] - JSON files, atomic temp-then-rename writes
//! - [`InMemoryCheckpointStore`] - In-memory checkpoints for testing
//! - [`SqliteWarehouse`] - Persistent SQLite warehouse (default, requires `sqlite` feature)
//! - [`InMemoryWarehouse`] - In-memory warehouse for testing

/// Checkpoint store implementations.
pub mod checkpoint;
/// Readers for industry classification tables.
pub mod classification;
/// In-memory warehouse implementation.
pub mod memory;

/// SQLite-based warehouse implementation.
#[cfg(feature = "sqlite")]
pub mod sqlite;

// Re-export the traits for convenience
pub use elt_core::{CheckpointStore, Warehouse};

// Re-export implementations
pub use checkpoint::{InMemoryCheckpointStore, JsonFileCheckpointStore};
pub use classification::ClassificationTables;
pub use memory::InMemoryWarehouse;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteWarehouse;
