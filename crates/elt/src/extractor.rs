//! Checkpointed, rate-limited batch price extraction.
//!
//! [`PriceExtractor::extract_range`] walks a ticker list in fixed-size
//! batches, retrying each fetch with a fixed backoff and pausing between
//! batches to stay under the upstream rate limit. Progress is checkpointed
//! after every finished ticker so an interrupted run resumes where it stopped.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use elt_core::{
    CheckpointStore, DateRange, EltError, Frequency, PriceBar, PriceDataProvider, Result, Symbol,
};

/// Default number of tickers per batch.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Default number of fetch attempts per ticker.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Default wait between attempts for the same ticker.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(15);

/// Default pause between batches.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(60);

/// Bars per ticker for every requested ticker that produced data.
pub type ExtractionResult = BTreeMap<Symbol, Vec<PriceBar>>;

/// Pacing and retry settings for [`PriceExtractor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractorConfig {
    /// Tickers per batch. Always at least 1.
    pub batch_size: usize,
    /// Fetch attempts per ticker. Always at least 1.
    pub max_retries: usize,
    /// Wait between attempts for the same ticker.
    pub retry_delay: Duration,
    /// Pause after each batch except the last.
    pub batch_delay: Duration,
    /// Bar frequency requested from the source.
    pub frequency: Frequency,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            batch_delay: DEFAULT_BATCH_DELAY,
            frequency: Frequency::Daily,
        }
    }
}

impl ExtractorConfig {
    /// Set the batch size; zero is raised to 1.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the attempt limit; zero is raised to 1.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Set the wait between attempts.
    #[must_use]
    pub const fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Set the pause between batches.
    #[must_use]
    pub const fn with_batch_delay(mut self, batch_delay: Duration) -> Self {
        self.batch_delay = batch_delay;
        self
    }

    /// Set the bar frequency.
    #[must_use]
    pub const fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }
}

/// Batch price extractor with per-ticker checkpointing.
///
/// One run per checkpoint location at a time; the extractor assumes it is the
/// only writer while [`extract_range`](Self::extract_range) is running.
///
/// # Example
///
/// ```rust,ignore
/// use std::{path::Path, sync::Arc};
/// use elt::{DateRange, JsonFileCheckpointStore, PolygonProvider, PriceExtractor, Symbol};
///
/// let extractor = PriceExtractor::new(
///     Arc::new(PolygonProvider::new("api_key")),
///     Arc::new(JsonFileCheckpointStore::new()),
/// );
/// let tickers = vec![Symbol::new("AAPL"), Symbol::new("MSFT")];
/// let range = DateRange::parse("2025-01-01", "2025-06-30")?;
/// let bars = extractor
///     .extract_range(&tickers, range, Path::new("checkpoints/price_extraction.json"))
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct PriceExtractor {
    source: Arc<dyn PriceDataProvider>,
    store: Arc<dyn CheckpointStore>,
    config: ExtractorConfig,
    cancel: CancellationToken,
}

impl PriceExtractor {
    /// Create an extractor with the default configuration.
    pub fn new(source: Arc<dyn PriceDataProvider>, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            source,
            store,
            config: ExtractorConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ExtractorConfig) -> Self {
        self.config = config
            .with_batch_size(config.batch_size)
            .with_max_retries(config.max_retries);
        self
    }

    /// Use an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that interrupts a running extraction when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current configuration.
    #[must_use]
    pub const fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Checkpoint store used for progress.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Fetch bars for every ticker in `items` over `range`.
    ///
    /// Tickers already marked processed in the checkpoint at `location` are
    /// skipped. Each remaining ticker is fetched up to `max_retries` times;
    /// a ticker that never succeeds is logged, marked processed and left out
    /// of the result. The checkpoint is saved after every ticker and removed
    /// once all tickers are done.
    ///
    /// # Errors
    /// Returns [`EltError::Interrupted`] if the cancellation token fires. The
    /// checkpoint then holds every ticker finished before the interruption and
    /// a later call with the same `location` resumes from there.
    #[instrument(skip(self, items), fields(items = items.len(), range = %range, location = %location.display()))]
    pub async fn extract_range(
        &self,
        items: &[Symbol],
        range: DateRange,
        location: &Path,
    ) -> Result<ExtractionResult> {
        let requested = unique_in_order(items);
        let mut record = self.store.load(location).await;

        let remaining: Vec<Symbol> = requested
            .iter()
            .filter(|symbol| !record.is_processed(symbol))
            .cloned()
            .collect();

        let batches: Vec<&[Symbol]> = remaining.chunks(self.config.batch_size).collect();
        info!(
            requested = requested.len(),
            remaining = remaining.len(),
            batches = batches.len(),
            "Starting price extraction"
        );

        for (index, batch) in batches.iter().enumerate() {
            info!(batch = index + 1, of = batches.len(), size = batch.len(), "Processing batch");

            for symbol in batch.iter() {
                match self.fetch_with_retry(symbol, range).await {
                    Ok(bars) => {
                        debug!(symbol = %symbol, bars = bars.len(), "Fetched price bars");
                        record.record_success(symbol.clone(), bars);
                    }
                    Err(e) if e.is_interrupted() => {
                        warn!(symbol = %symbol, "Extraction interrupted; progress is checkpointed");
                        return Err(e);
                    }
                    Err(e) => {
                        error!(
                            symbol = %symbol,
                            attempts = self.config.max_retries,
                            error = %e,
                            "Giving up on ticker"
                        );
                        record.record_failure(symbol.clone());
                    }
                }
                self.store.save(location, &mut record).await;
            }

            if index + 1 < batches.len() {
                info!(
                    delay_secs = self.config.batch_delay.as_secs(),
                    "Pausing between batches"
                );
                if let Err(e) = self.pause(self.config.batch_delay).await {
                    warn!("Extraction interrupted between batches; progress is checkpointed");
                    return Err(e);
                }
            }
        }

        self.store.clear(location).await;

        let failed = requested
            .iter()
            .filter(|s| !record.results.contains_key(*s))
            .count();
        let mut results = record.results;
        let extracted: ExtractionResult = requested
            .into_iter()
            .filter_map(|symbol| results.remove(&symbol).map(|bars| (symbol, bars)))
            .collect();

        info!(tickers = extracted.len(), failed, "Price extraction complete");
        Ok(extracted)
    }

    /// Fetch one ticker, retrying every failure until the attempt limit.
    async fn fetch_with_retry(&self, symbol: &Symbol, range: DateRange) -> Result<Vec<PriceBar>> {
        let mut attempt = 1;
        loop {
            let fetch = self.source.fetch_bars(symbol, range, self.config.frequency);
            let outcome = tokio::select! {
                biased;
                () = self.cancel.cancelled() => Err(interrupted()),
                outcome = fetch => outcome,
            };

            match outcome {
                Ok(bars) => return Ok(bars),
                Err(e) if e.is_interrupted() => return Err(e),
                Err(e) if attempt < self.config.max_retries => {
                    warn!(
                        symbol = %symbol,
                        attempt,
                        max_retries = self.config.max_retries,
                        error = %e,
                        "Fetch failed, retrying"
                    );
                    self.pause(self.config.retry_delay).await?;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sleep for `delay` unless cancelled first.
    async fn pause(&self, delay: Duration) -> Result<()> {
        if delay.is_zero() {
            return if self.cancel.is_cancelled() {
                Err(interrupted())
            } else {
                Ok(())
            };
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(interrupted()),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

fn interrupted() -> EltError {
    EltError::Interrupted("price extraction cancelled".to_string())
}

/// Drop repeated tickers, keeping the first occurrence.
fn unique_in_order(items: &[Symbol]) -> Vec<Symbol> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .iter()
        .filter(|symbol| seen.insert((*symbol).clone()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use elt_core::{CheckpointRecord, DataProvider};
    use elt_store::InMemoryCheckpointStore;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Mutex;
    use tokio::time::Instant;

    const LOCATION: &str = "checkpoints/price_extraction.json";

    /// Source that fails a scripted number of times per ticker and can
    /// cancel the run when it reaches a given ticker.
    #[derive(Debug, Default)]
    struct ScriptedSource {
        failures: Mutex<HashMap<Symbol, usize>>,
        calls: Mutex<Vec<Symbol>>,
        cancel_on: Option<(Symbol, CancellationToken)>,
    }

    impl ScriptedSource {
        fn failing(mut self, symbol: &str, times: usize) -> Self {
            self.failures.get_mut().unwrap().insert(Symbol::new(symbol), times);
            self
        }

        fn cancelling_at(mut self, symbol: &str, token: CancellationToken) -> Self {
            self.cancel_on = Some((Symbol::new(symbol), token));
            self
        }

        fn calls(&self) -> Vec<Symbol> {
            self.calls.lock().unwrap().clone()
        }

        fn calls_for(&self, symbol: &str) -> usize {
            let symbol = Symbol::new(symbol);
            self.calls().iter().filter(|s| **s == symbol).count()
        }
    }

    impl DataProvider for ScriptedSource {
        fn name(&self) -> &str {
            "Scripted"
        }

        fn description(&self) -> &str {
            "Scripted price source"
        }
    }

    #[async_trait]
    impl PriceDataProvider for ScriptedSource {
        async fn fetch_bars(
            &self,
            symbol: &Symbol,
            _range: DateRange,
            _frequency: Frequency,
        ) -> Result<Vec<PriceBar>> {
            self.calls.lock().unwrap().push(symbol.clone());

            if let Some((target, token)) = &self.cancel_on {
                if target == symbol {
                    token.cancel();
                    std::future::pending::<()>().await;
                }
            }

            let should_fail = {
                let mut failures = self.failures.lock().unwrap();
                match failures.get_mut(symbol) {
                    Some(left) if *left > 0 => {
                        *left -= 1;
                        true
                    }
                    _ => false,
                }
            };
            if should_fail {
                return Err(EltError::Network(format!("{symbol}: upstream timeout")));
            }

            Ok(vec![bar_for(symbol)])
        }
    }

    /// Store whose writes always fail.
    #[derive(Debug)]
    struct ReadOnlyStore;

    #[async_trait]
    impl CheckpointStore for ReadOnlyStore {
        async fn read(&self, _location: &Path) -> Result<Option<CheckpointRecord>> {
            Ok(None)
        }

        async fn write(&self, _location: &Path, _record: &CheckpointRecord) -> Result<()> {
            Err(EltError::Checkpoint("read-only filesystem".to_string()))
        }

        async fn remove(&self, _location: &Path) -> Result<()> {
            Err(EltError::Checkpoint("read-only filesystem".to_string()))
        }
    }

    fn bar_for(symbol: &Symbol) -> PriceBar {
        let ts = Utc.with_ymd_and_hms(2025, 1, 2, 5, 0, 0).unwrap();
        let close = symbol.as_str().len() as f64;
        PriceBar::new(ts, close, close, close, close, 1_000.0)
    }

    fn symbols(names: &[&str]) -> Vec<Symbol> {
        names.iter().map(|n| Symbol::new(*n)).collect()
    }

    fn range() -> DateRange {
        DateRange::parse("2025-01-01", "2025-01-31").unwrap()
    }

    fn extractor(
        source: &Arc<ScriptedSource>,
        store: &Arc<InMemoryCheckpointStore>,
    ) -> PriceExtractor {
        PriceExtractor::new(source.clone(), store.clone())
    }

    const SIX: &[&str] = &["AAA", "BBB", "CCC", "DDD", "EEE", "FFF"];

    #[tokio::test(start_paused = true)]
    async fn test_two_batches_one_pause() {
        let source = Arc::new(ScriptedSource::default());
        let store = Arc::new(InMemoryCheckpointStore::new());
        let location = Path::new(LOCATION);

        let started = Instant::now();
        let result = extractor(&source, &store)
            .extract_range(&symbols(SIX), range(), location)
            .await
            .unwrap();

        assert_eq!(started.elapsed(), DEFAULT_BATCH_DELAY);
        assert_eq!(source.calls(), symbols(SIX));
        assert_eq!(result.len(), 6);
        assert_eq!(store.write_count(), 6);
        assert!(store.snapshot(location).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_count_per_batch_boundary() {
        for (count, pauses) in [(0u32, 0u32), (1, 0), (5, 0), (6, 1), (10, 1), (11, 2)] {
            let source = Arc::new(ScriptedSource::default());
            let store = Arc::new(InMemoryCheckpointStore::new());
            let items: Vec<Symbol> = (0..count).map(|i| Symbol::new(format!("T{i}"))).collect();

            let started = Instant::now();
            let result = extractor(&source, &store)
                .extract_range(&items, range(), Path::new(LOCATION))
                .await
                .unwrap();

            assert_eq!(started.elapsed(), DEFAULT_BATCH_DELAY * pauses, "{count} items");
            assert_eq!(result.len(), count as usize);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_after_first_batch_then_resume() {
        let token = CancellationToken::new();
        let source = Arc::new(ScriptedSource::default().cancelling_at("FFF", token.clone()));
        let store = Arc::new(InMemoryCheckpointStore::new());
        let location = Path::new(LOCATION);

        let err = extractor(&source, &store)
            .with_cancellation(token)
            .extract_range(&symbols(SIX), range(), location)
            .await
            .unwrap_err();
        assert!(err.is_interrupted());

        let saved = store.snapshot(location).await.unwrap();
        assert_eq!(
            saved.processed,
            symbols(&SIX[..5]).into_iter().collect::<BTreeSet<_>>()
        );
        assert!(!saved.results.contains_key(&Symbol::new("FFF")));

        let resumed = Arc::new(ScriptedSource::default());
        let result = extractor(&resumed, &store)
            .extract_range(&symbols(SIX), range(), location)
            .await
            .unwrap();

        assert_eq!(resumed.calls(), symbols(&["FFF"]));
        assert_eq!(result.keys().cloned().collect::<Vec<_>>(), symbols(SIX));
        assert!(store.snapshot(location).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_on_third_attempt() {
        let source = Arc::new(ScriptedSource::default().failing("BBB", 2));
        let store = Arc::new(InMemoryCheckpointStore::new());

        let started = Instant::now();
        let result = extractor(&source, &store)
            .extract_range(&symbols(&["AAA", "BBB"]), range(), Path::new(LOCATION))
            .await
            .unwrap();

        assert_eq!(source.calls_for("BBB"), 3);
        assert_eq!(started.elapsed(), DEFAULT_RETRY_DELAY * 2);
        assert_eq!(result[&Symbol::new("BBB")], vec![bar_for(&Symbol::new("BBB"))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_ticker_not_retried_on_resume() {
        let token = CancellationToken::new();
        let source = Arc::new(
            ScriptedSource::default()
                .failing("CCC", usize::MAX)
                .cancelling_at("DDD", token.clone()),
        );
        let store = Arc::new(InMemoryCheckpointStore::new());
        let location = Path::new(LOCATION);
        let items = symbols(&["AAA", "CCC", "DDD"]);

        let started = Instant::now();
        let err = extractor(&source, &store)
            .with_cancellation(token)
            .extract_range(&items, range(), location)
            .await
            .unwrap_err();
        assert!(err.is_interrupted());
        assert_eq!(source.calls_for("CCC"), DEFAULT_MAX_RETRIES);
        assert_eq!(started.elapsed(), DEFAULT_RETRY_DELAY * 2);

        let saved = store.snapshot(location).await.unwrap();
        assert!(saved.is_processed(&Symbol::new("CCC")));
        assert!(!saved.results.contains_key(&Symbol::new("CCC")));
        assert_eq!(saved.failed().cloned().collect::<Vec<_>>(), symbols(&["CCC"]));

        let resumed = Arc::new(ScriptedSource::default());
        let result = extractor(&resumed, &store)
            .extract_range(&items, range(), location)
            .await
            .unwrap();

        assert_eq!(resumed.calls(), symbols(&["DDD"]));
        assert_eq!(result.keys().cloned().collect::<Vec<_>>(), symbols(&["AAA", "DDD"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_batch_pause() {
        let source = Arc::new(ScriptedSource::default());
        let store = Arc::new(InMemoryCheckpointStore::new());
        let location = Path::new(LOCATION);
        let extractor = extractor(&source, &store);

        let token = extractor.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            token.cancel();
        });

        let started = Instant::now();
        let err = extractor
            .extract_range(&symbols(SIX), range(), location)
            .await
            .unwrap_err();

        assert!(err.is_interrupted());
        assert_eq!(started.elapsed(), Duration::from_secs(30));
        assert_eq!(source.calls(), symbols(&SIX[..5]));
        let saved = store.snapshot(location).await.unwrap();
        assert_eq!(saved.processed.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicates_fetched_once() {
        let source = Arc::new(ScriptedSource::default());
        let store = Arc::new(InMemoryCheckpointStore::new());

        let result = extractor(&source, &store)
            .extract_range(&symbols(&["AAA", "BBB", "aaa", "AAA"]), range(), Path::new(LOCATION))
            .await
            .unwrap();

        assert_eq!(source.calls(), symbols(&["AAA", "BBB"]));
        assert_eq!(result.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_restricted_to_requested() {
        let source = Arc::new(ScriptedSource::default());
        let store = Arc::new(InMemoryCheckpointStore::new());
        let location = Path::new(LOCATION);

        let mut seeded = CheckpointRecord::new();
        seeded.record_success(Symbol::new("AAA"), vec![bar_for(&Symbol::new("AAA"))]);
        seeded.record_success(Symbol::new("ZZZ"), vec![bar_for(&Symbol::new("ZZZ"))]);
        store.write(location, &seeded).await.unwrap();

        let result = extractor(&source, &store)
            .extract_range(&symbols(&["AAA", "BBB"]), range(), location)
            .await
            .unwrap();

        assert_eq!(source.calls(), symbols(&["BBB"]));
        assert_eq!(result.keys().cloned().collect::<Vec<_>>(), symbols(&["AAA", "BBB"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkpoint_write_failures_are_not_fatal() {
        let source = Arc::new(ScriptedSource::default());
        let result = PriceExtractor::new(source.clone(), Arc::new(ReadOnlyStore))
            .extract_range(&symbols(&["AAA", "BBB"]), range(), Path::new(LOCATION))
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_config_pacing() {
        let source = Arc::new(ScriptedSource::default().failing("AAA", 1));
        let store = Arc::new(InMemoryCheckpointStore::new());
        let config = ExtractorConfig::default()
            .with_batch_size(2)
            .with_retry_delay(Duration::from_secs(1))
            .with_batch_delay(Duration::from_secs(10));

        let started = Instant::now();
        extractor(&source, &store)
            .with_config(config)
            .extract_range(&symbols(&["AAA", "BBB", "CCC"]), range(), Path::new(LOCATION))
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(11));
    }

    #[test]
    fn test_config_clamps_to_one() {
        let config = ExtractorConfig::default()
            .with_batch_size(0)
            .with_max_retries(0);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.max_retries, 1);

        let raw = ExtractorConfig {
            batch_size: 0,
            max_retries: 0,
            ..ExtractorConfig::default()
        };
        let source: Arc<dyn PriceDataProvider> = Arc::new(ScriptedSource::default());
        let extractor = PriceExtractor::new(source, Arc::new(InMemoryCheckpointStore::new()))
            .with_config(raw);
        assert_eq!(extractor.config().batch_size, 1);
        assert_eq!(extractor.config().max_retries, 1);
    }
}
