//! Checkpoint record and store trait for resumable extraction.
//!
//! A [`CheckpointRecord`] captures which symbols a batch extraction has already
//! attempted and the bars fetched for the successful ones. Stores implement the
//! fallible primitives ([`read`](CheckpointStore::read),
//! [`write`](CheckpointStore::write), [`remove`](CheckpointStore::remove)); the
//! provided [`load`](CheckpointStore::load), [`save`](CheckpointStore::save)
//! and [`clear`](CheckpointStore::clear) wrap them so that checkpoint I/O never
//! fails an extraction run.

use async_trait::async_trait;
use chrono::{NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::path::Path;
use tracing::{debug, warn};

use crate::{
    error::Result,
    types::{PriceBar, Symbol},
};

/// Persisted progress of a batch extraction.
///
/// `processed` may hold symbols that have no entry in `results`: those
/// exhausted their retries and must not be attempted again in this lineage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Bars fetched so far, keyed by symbol.
    #[serde(default)]
    pub results: BTreeMap<Symbol, Vec<PriceBar>>,
    /// Symbols already attempted, successfully or not.
    #[serde(default)]
    pub processed: BTreeSet<Symbol>,
    /// UTC time of the last save.
    #[serde(default, with = "last_updated_format")]
    pub last_updated: Option<NaiveDateTime>,
}

impl CheckpointRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if nothing has been processed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processed.is_empty() && self.results.is_empty()
    }

    /// Returns true if the symbol was already attempted.
    #[must_use]
    pub fn is_processed(&self, symbol: &Symbol) -> bool {
        self.processed.contains(symbol)
    }

    /// Records a successful fetch.
    pub fn record_success(&mut self, symbol: Symbol, bars: Vec<PriceBar>) {
        self.processed.insert(symbol.clone());
        self.results.insert(symbol, bars);
    }

    /// Records a symbol that exhausted its retries.
    pub fn record_failure(&mut self, symbol: Symbol) {
        self.processed.insert(symbol);
    }

    /// Symbols that were attempted but produced no results.
    pub fn failed(&self) -> impl Iterator<Item = &Symbol> {
        self.processed
            .iter()
            .filter(|s| !self.results.contains_key(*s))
    }

    /// Stamps the record with the current time, to the second.
    pub fn touch(&mut self) {
        self.last_updated = Some(Utc::now().trunc_subsecs(0).naive_utc());
    }
}

/// Durable storage for [`CheckpointRecord`]s, keyed by a location.
///
/// One extraction run per location at a time; concurrent writers to the same
/// location are not guarded against.
#[async_trait]
pub trait CheckpointStore: Send + Sync + Debug {
    /// Reads the record at `location`, `Ok(None)` if absent.
    async fn read(&self, location: &Path) -> Result<Option<CheckpointRecord>>;

    /// Atomically replaces the record at `location`.
    async fn write(&self, location: &Path, record: &CheckpointRecord) -> Result<()>;

    /// Removes the record at `location`. Absent records are not an error.
    async fn remove(&self, location: &Path) -> Result<()>;

    /// Loads the record at `location`.
    ///
    /// Missing, unreadable or corrupt records yield an empty record.
    async fn load(&self, location: &Path) -> CheckpointRecord {
        match self.read(location).await {
            Ok(Some(record)) => {
                debug!(
                    location = %location.display(),
                    processed = record.processed.len(),
                    "Loaded checkpoint"
                );
                record
            }
            Ok(None) => CheckpointRecord::new(),
            Err(e) => {
                warn!(
                    location = %location.display(),
                    error = %e,
                    "Ignoring unreadable checkpoint, starting fresh"
                );
                CheckpointRecord::new()
            }
        }
    }

    /// Stamps and persists `record`. Failures are logged and swallowed.
    ///
    /// Returns true if the record was written.
    async fn save(&self, location: &Path, record: &mut CheckpointRecord) -> bool {
        record.touch();
        match self.write(location, record).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    location = %location.display(),
                    error = %e,
                    "Failed to save checkpoint"
                );
                false
            }
        }
    }

    /// Removes the record at `location`. Failures are logged and swallowed.
    async fn clear(&self, location: &Path) {
        match self.remove(location).await {
            Ok(()) => debug!(location = %location.display(), "Cleared checkpoint"),
            Err(e) => warn!(
                location = %location.display(),
                error = %e,
                "Failed to clear checkpoint"
            ),
        }
    }
}

/// `YYYY-MM-DD HH:MM:SS` encoding of the optional save timestamp.
mod last_updated_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub(super) fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|s| NaiveDateTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom))
            .transpose()
    }
}
