#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/elt/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Alpha Vantage fundamentals downloader.
//!
//! # Usage
//!
//! ```rust,ignore
//! use elt_alphavantage::{FundamentalsDownloader, StatementSelection};
//! use elt_core::Symbol;
//!
//! # async fn example() -> elt_core::Result<()> {
//! let downloader = FundamentalsDownloader::new("your_api_key", "/data/fundamentals")
//!     .with_selection(StatementSelection::All);
//! let written = downloader.download(&[Symbol::new("IBM")]).await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use elt_core::{EltError, Result, Symbol};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

/// Alpha Vantage query endpoint.
const ALPHA_VANTAGE_URL: &str = "https://www.alphavantage.co/query";

/// A fundamental statement type exposed by Alpha Vantage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Statement {
    /// `INCOME_STATEMENT`
    IncomeStatement,
    /// `BALANCE_SHEET`
    BalanceSheet,
    /// `CASH_FLOW`
    CashFlow,
    /// `EARNINGS`
    Earnings,
    /// `OVERVIEW`
    Overview,
}

impl Statement {
    /// Every statement type, in download order.
    pub const ALL: [Self; 5] = [
        Self::IncomeStatement,
        Self::BalanceSheet,
        Self::CashFlow,
        Self::Earnings,
        Self::Overview,
    ];

    /// The `function` query parameter.
    #[must_use]
    pub const fn function(&self) -> &'static str {
        match self {
            Self::IncomeStatement => "INCOME_STATEMENT",
            Self::BalanceSheet => "BALANCE_SHEET",
            Self::CashFlow => "CASH_FLOW",
            Self::Earnings => "EARNINGS",
            Self::Overview => "OVERVIEW",
        }
    }

    /// Destination folder for this statement type.
    #[must_use]
    pub const fn folder(&self) -> &'static str {
        match self {
            Self::IncomeStatement => "Income Statement",
            Self::BalanceSheet => "Balance Sheet",
            Self::CashFlow => "Cash Flow",
            Self::Earnings => "Earnings",
            Self::Overview => "Overview",
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.function())
    }
}

impl FromStr for Statement {
    type Err = EltError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|st| st.function().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EltError::InvalidParameter(format!("Unknown statement: {s}")))
    }
}

/// Which statements to download.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatementSelection {
    /// All statement types.
    #[default]
    All,
    /// A single statement type.
    One(Statement),
}

impl StatementSelection {
    /// The selected statement types.
    #[must_use]
    pub fn statements(&self) -> Vec<Statement> {
        match self {
            Self::All => Statement::ALL.to_vec(),
            Self::One(st) => vec![*st],
        }
    }
}

impl FromStr for StatementSelection {
    type Err = EltError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("ALL") {
            Ok(Self::All)
        } else {
            s.parse().map(Self::One)
        }
    }
}

/// Downloads fundamental statements to a folder tree.
#[derive(Clone)]
pub struct FundamentalsDownloader {
    client: Client,
    api_key: String,
    destination: PathBuf,
    selection: StatementSelection,
}

impl fmt::Debug for FundamentalsDownloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FundamentalsDownloader")
            .field("destination", &self.destination)
            .field("selection", &self.selection)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl FundamentalsDownloader {
    /// Create a downloader writing under `destination`.
    #[must_use]
    pub fn new(api_key: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            destination: destination.into(),
            selection: StatementSelection::All,
        }
    }

    /// Restrict the statement types downloaded.
    #[must_use]
    pub fn with_selection(mut self, selection: StatementSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Path a statement for `symbol` fetched on `date` is written to.
    #[must_use]
    pub fn statement_path(&self, symbol: &Symbol, statement: Statement, date: NaiveDate) -> PathBuf {
        self.destination.join(statement.folder()).join(format!(
            "{}_{}{}.json",
            symbol.as_str(),
            statement.function(),
            date.format("%Y-%m-%d")
        ))
    }

    /// Download the selected statements for every ticker.
    ///
    /// Failures for one ticker/statement pair are logged and skipped. Returns
    /// the paths written.
    pub async fn download(&self, tickers: &[Symbol]) -> Result<Vec<PathBuf>> {
        let statements = self.selection.statements();
        let today = Utc::now().date_naive();
        let mut written = Vec::with_capacity(tickers.len() * statements.len());

        info!(
            tickers = tickers.len(),
            statements = statements.len(),
            "Starting fundamentals download"
        );

        for symbol in tickers {
            for statement in &statements {
                match self.download_statement(symbol, *statement, today).await {
                    Ok(path) => {
                        info!(symbol = %symbol, statement = %statement, "Saved statement");
                        written.push(path);
                    }
                    Err(e) => {
                        warn!(
                            symbol = %symbol,
                            statement = %statement,
                            error = %e,
                            "Failed to download statement"
                        );
                    }
                }
            }
        }

        Ok(written)
    }

    /// Fetch one statement and write it pretty-printed.
    async fn download_statement(
        &self,
        symbol: &Symbol,
        statement: Statement,
        date: NaiveDate,
    ) -> Result<PathBuf> {
        let response = self
            .client
            .get(ALPHA_VANTAGE_URL)
            .query(&[
                ("function", statement.function()),
                ("symbol", symbol.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| EltError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| EltError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(EltError::Network(format!("HTTP {status}: {text}")));
        }

        let body = check_body(symbol, &text)?;
        let path = self.statement_path(symbol, statement, date);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let pretty =
            serde_json::to_string_pretty(&body).map_err(|e| EltError::Parse(e.to_string()))?;
        tokio::fs::write(&path, pretty).await?;
        Ok(path)
    }
}

/// Parse a response body, mapping Alpha Vantage's in-band errors.
///
/// Alpha Vantage answers 200 even when throttled or when the symbol is
/// unknown; the condition is reported in a top-level message field.
fn check_body(symbol: &Symbol, text: &str) -> Result<serde_json::Value> {
    let body: serde_json::Value =
        serde_json::from_str(text).map_err(|e| EltError::Parse(format!("{e}: {text}")))?;

    if body.get("Note").is_some() || body.get("Information").is_some() {
        return Err(EltError::RateLimited {
            provider: "Alpha Vantage".to_string(),
            retry_after: None,
        });
    }
    if body.get("Error Message").is_some() {
        return Err(EltError::SymbolNotFound(symbol.to_string()));
    }
    if body.as_object().is_some_and(|o| o.is_empty()) {
        return Err(EltError::DataNotAvailable {
            symbol: symbol.to_string(),
            start: String::new(),
            end: String::new(),
        });
    }
    Ok(body)
}

/// Fiscal period end dates of the quarterly reports in a saved statement.
pub async fn report_dates(path: impl AsRef<Path>) -> Result<Vec<NaiveDate>> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path).await?;
    let statement: SavedStatement = serde_json::from_str(&text)
        .map_err(|e| EltError::Parse(format!("{}: {e}", path.display())))?;

    statement
        .quarterly_reports
        .iter()
        .map(|r| {
            NaiveDate::parse_from_str(&r.fiscal_date_ending, "%Y-%m-%d").map_err(|e| {
                EltError::Parse(format!("Invalid fiscalDateEnding {}: {e}", r.fiscal_date_ending))
            })
        })
        .collect()
}

/// Saved statement file, only the fields needed for report dates.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedStatement {
    #[serde(default)]
    quarterly_reports: Vec<SavedReport>,
}

/// One quarterly report entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedReport {
    fiscal_date_ending: String,
}
