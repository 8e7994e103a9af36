//! `elt` command-line tool.
//!
//! Commands:
//! - `details` - load Polygon.io company details into the warehouse
//! - `prices` - checkpointed, rate-limited price extraction and load
//! - `yields` - load the FRED treasury curve
//! - `classify` - replace the SIC, NAICS and crosswalk lookup tables
//! - `fundamentals` - download Alpha Vantage statements to disk
//! - `checkpoint status|clear` - inspect or discard an extraction checkpoint

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use elt::{
    CancellationToken, CheckpointStore, ClassificationTables, DateRange, EltConfig, EltError,
    FredProvider, FundamentalsDownloader, JsonFileCheckpointStore, Pipeline, PolygonProvider,
    PriceExtractor, SqliteWarehouse, StatementSelection, Symbol, Warehouse,
};

/// Exit status for a run stopped by Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "elt", about = "Financial reference-data ELT pipeline", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level used when RUST_LOG is unset (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, default_value_t = false, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch company details from Polygon.io and upsert them.
    Details {
        /// Tickers to load (e.g., AAPL MSFT).
        #[arg(required = true)]
        tickers: Vec<Symbol>,
    },
    /// Extract daily bars from Polygon.io with checkpointing and upsert them.
    Prices {
        /// Tickers to extract. Defaults to every classified ticker in the warehouse.
        tickers: Vec<Symbol>,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: NaiveDate,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Checkpoint file. Defaults to CHECKPOINT_PATH.
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Tickers per batch.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Fetch attempts per ticker.
        #[arg(long)]
        max_retries: Option<usize>,

        /// Seconds between attempts for one ticker.
        #[arg(long)]
        retry_delay_secs: Option<u64>,

        /// Seconds between batches.
        #[arg(long)]
        batch_delay_secs: Option<u64>,
    },
    /// Load the FRED constant-maturity treasury curve.
    Yields {
        /// Start date (YYYY-MM-DD). Defaults to the full history.
        #[arg(long)]
        start: Option<NaiveDate>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Replace the SIC, NAICS and SIC to NAICS lookup tables.
    Classify {
        /// SIC lookup file (CSV or parquet).
        #[arg(long, default_value = "data/sic_codes.csv")]
        sic: PathBuf,

        /// NAICS lookup file (CSV or parquet).
        #[arg(long, default_value = "data/naics_codes.csv")]
        naics: PathBuf,

        /// SIC to NAICS crosswalk (CSV or parquet).
        #[arg(long, default_value = "data/sic_naics.parquet")]
        crosswalk: PathBuf,
    },
    /// Download Alpha Vantage fundamental statements as JSON files.
    Fundamentals {
        /// Tickers to download.
        #[arg(required = true)]
        tickers: Vec<Symbol>,

        /// Statement to download (ALL, INCOME_STATEMENT, BALANCE_SHEET, CASH_FLOW, EARNINGS, OVERVIEW).
        #[arg(long, default_value = "ALL")]
        statement: StatementSelection,

        /// Output directory. Defaults to FUNDAMENTALS_DATA_PATH.
        #[arg(long)]
        dest: Option<PathBuf>,
    },
    /// Inspect or discard a price extraction checkpoint.
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Report processed, extracted and failed tickers.
    Status {
        /// Checkpoint file. Defaults to CHECKPOINT_PATH.
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Delete the checkpoint so the next run starts fresh.
    Clear {
        /// Checkpoint file. Defaults to CHECKPOINT_PATH.
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_json);

    let config = EltConfig::from_env();
    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if is_interrupted(&e) => {
            warn!("Interrupted; rerun the same command to resume");
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

fn is_interrupted(e: &anyhow::Error) -> bool {
    e.downcast_ref::<EltError>()
        .is_some_and(EltError::is_interrupted)
}

async fn run(command: Commands, config: EltConfig) -> Result<()> {
    match command {
        Commands::Details { tickers } => {
            let pipeline = Pipeline::new(open_warehouse(&config)?)
                .with_reference(Arc::new(PolygonProvider::new(config.polygon_api_key()?)));
            let loaded = pipeline.load_ticker_details(&tickers).await?;
            println!("Loaded details for {loaded} of {} tickers", tickers.len());
        }
        Commands::Prices {
            tickers,
            start,
            end,
            checkpoint,
            batch_size,
            max_retries,
            retry_delay_secs,
            batch_delay_secs,
        } => {
            let range = DateRange::new(start, end.unwrap_or_else(today))?;
            let warehouse = open_warehouse(&config)?;
            let tickers = if tickers.is_empty() {
                let universe = warehouse.classified_tickers().await?;
                info!(tickers = universe.len(), "Using classified tickers");
                universe
            } else {
                tickers
            };
            if tickers.is_empty() {
                bail!("No tickers given and none classified in the warehouse; run `elt details` and `elt classify` first");
            }

            let mut settings = config.extractor;
            if let Some(size) = batch_size {
                settings = settings.with_batch_size(size);
            }
            if let Some(retries) = max_retries {
                settings = settings.with_max_retries(retries);
            }
            if let Some(secs) = retry_delay_secs {
                settings = settings.with_retry_delay(Duration::from_secs(secs));
            }
            if let Some(secs) = batch_delay_secs {
                settings = settings.with_batch_delay(Duration::from_secs(secs));
            }

            let extractor = PriceExtractor::new(
                Arc::new(PolygonProvider::new(config.polygon_api_key()?)),
                Arc::new(JsonFileCheckpointStore::new()),
            )
            .with_config(settings)
            .with_cancellation(cancel_on_ctrl_c());

            let location = checkpoint.unwrap_or_else(|| config.checkpoint_path.clone());
            let written = Pipeline::new(warehouse)
                .load_prices(&extractor, &tickers, range, &location)
                .await?;
            println!("Loaded {written} bars for {} tickers", tickers.len());
        }
        Commands::Yields { start, end } => {
            let range = match start {
                Some(start) => Some(DateRange::new(start, end.unwrap_or_else(today))?),
                None => None,
            };
            let pipeline = Pipeline::new(open_warehouse(&config)?)
                .with_series(Arc::new(FredProvider::new(config.fred_api_key()?)));
            let rows = pipeline.load_treasury_curve(range).await?;
            println!("Loaded {rows} treasury curve rows");
        }
        Commands::Classify {
            sic,
            naics,
            crosswalk,
        } => {
            let tables = ClassificationTables::read(&sic, &naics, &crosswalk)
                .context("reading classification files")?;
            let counts = Pipeline::new(open_warehouse(&config)?)
                .load_classification(&tables)
                .await?;
            println!(
                "Loaded {} SIC codes, {} NAICS codes, {} crosswalk rows",
                counts.sic_codes, counts.naics_codes, counts.sic_to_naics
            );
        }
        Commands::Fundamentals {
            tickers,
            statement,
            dest,
        } => {
            let dest = dest.unwrap_or_else(|| config.fundamentals_path.clone());
            let downloader = FundamentalsDownloader::new(config.alpha_vantage_api_key()?, &dest)
                .with_selection(statement);
            let written = downloader.download(&tickers).await?;
            println!("Wrote {} files under {}", written.len(), dest.display());
        }
        Commands::Checkpoint { action } => match action {
            CheckpointAction::Status { path } => {
                let location = path.unwrap_or_else(|| config.checkpoint_path.clone());
                checkpoint_status(&location).await?;
            }
            CheckpointAction::Clear { path } => {
                let location = path.unwrap_or_else(|| config.checkpoint_path.clone());
                JsonFileCheckpointStore::new()
                    .remove(&location)
                    .await
                    .with_context(|| format!("removing {}", location.display()))?;
                println!("Cleared {}", location.display());
            }
        },
    }
    Ok(())
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn open_warehouse(config: &EltConfig) -> Result<Arc<dyn Warehouse>> {
    let path = config.db_path()?;
    let warehouse = SqliteWarehouse::open(path)
        .with_context(|| format!("opening warehouse {}", path.display()))?;
    Ok(Arc::new(warehouse))
}

/// Token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping after the current step");
            cancel.cancel();
        }
    });
    token
}

async fn checkpoint_status(location: &Path) -> Result<()> {
    let store = JsonFileCheckpointStore::new();
    let Some(record) = store
        .read(location)
        .await
        .with_context(|| format!("reading {}", location.display()))?
    else {
        println!("No checkpoint at {}", location.display());
        return Ok(());
    };

    let failed: Vec<&str> = record.failed().map(Symbol::as_str).collect();
    println!("Checkpoint: {}", location.display());
    if let Some(updated) = record.last_updated {
        println!("  last updated: {updated}");
    }
    println!("  processed:    {}", record.processed.len());
    println!("  extracted:    {}", record.results.len());
    println!("  failed:       {}", failed.len());
    if !failed.is_empty() {
        println!("  failed tickers: {}", failed.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_prices() {
        let cli = Cli::try_parse_from([
            "elt", "prices", "aapl", "MSFT", "--start", "2025-01-01", "--batch-size", "2",
        ])
        .unwrap();
        let Commands::Prices {
            tickers,
            start,
            end,
            batch_size,
            ..
        } = cli.command
        else {
            panic!("expected prices command");
        };
        assert_eq!(tickers, vec![Symbol::new("AAPL"), Symbol::new("MSFT")]);
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert!(end.is_none());
        assert_eq!(batch_size, Some(2));
    }

    #[test]
    fn test_parse_statement_selection() {
        let cli = Cli::try_parse_from([
            "elt",
            "fundamentals",
            "IBM",
            "--statement",
            "balance_sheet",
            "--log-json",
        ])
        .unwrap();
        assert!(cli.log_json);
        let Commands::Fundamentals { statement, .. } = cli.command else {
            panic!("expected fundamentals command");
        };
        assert_eq!(
            statement,
            StatementSelection::One(elt::Statement::BalanceSheet)
        );
    }

    #[test]
    fn test_interrupted_error_detected() {
        let err = anyhow::Error::from(EltError::Interrupted("stop".to_string()));
        assert!(is_interrupted(&err));
        assert!(!is_interrupted(&anyhow::anyhow!("other")));
    }
}
