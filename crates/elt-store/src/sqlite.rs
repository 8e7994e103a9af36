//! SQLite-based warehouse implementation.

use async_trait::async_trait;
use chrono::DateTime;
use elt_core::{
    CompanyDetails, EltError, NaicsCode, PriceBar, Result, SicCode, SicNaicsMapping, Symbol,
    TreasuryCurvePoint, Warehouse,
};
use polars::prelude::*;
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS company_details (
        ticker TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        market_cap REAL,
        active INTEGER,
        composite_figi TEXT,
        base_currency TEXT,
        list_date TEXT,
        primary_exchange TEXT,
        shares_outstanding INTEGER,
        total_employees INTEGER,
        sic_code INTEGER
    );
    CREATE TABLE IF NOT EXISTS price_data (
        ticker TEXT NOT NULL,
        date TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        open REAL NOT NULL,
        high REAL NOT NULL,
        low REAL NOT NULL,
        close REAL NOT NULL,
        volume REAL NOT NULL,
        vwap REAL,
        transactions INTEGER,
        PRIMARY KEY (ticker, date)
    );
    CREATE TABLE IF NOT EXISTS treasury_curves (
        date TEXT PRIMARY KEY,
        dgs1mo REAL,
        dgs3mo REAL,
        dgs6mo REAL,
        dgs1 REAL,
        dgs2 REAL,
        dgs5 REAL,
        dgs10 REAL,
        dgs30 REAL
    );
    CREATE TABLE IF NOT EXISTS sic_codes (
        sic_code INTEGER PRIMARY KEY,
        office TEXT,
        industry TEXT
    );
    CREATE TABLE IF NOT EXISTS naics_codes (
        naics_code INTEGER PRIMARY KEY,
        description TEXT
    );
    CREATE TABLE IF NOT EXISTS sic_to_naics (
        sic_code INTEGER,
        sic_description TEXT,
        naics_code INTEGER,
        naics_description TEXT,
        PRIMARY KEY (sic_code, naics_code)
    );
";

fn db_err(e: impl std::fmt::Display) -> EltError {
    EltError::Warehouse(e.to_string())
}

/// SQLite-backed warehouse holding the analytical tables.
///
/// The connection sits behind a `Mutex`; every write runs in a single
/// transaction.
#[derive(Debug)]
pub struct SqliteWarehouse {
    conn: Mutex<Connection>,
}

impl SqliteWarehouse {
    /// Open (or create) the warehouse at the given path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory warehouse. Data is lost when it is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(db_err)
    }

    /// Stored bars for a ticker, oldest first.
    pub fn price_bars(&self, ticker: &Symbol) -> Result<Vec<PriceBar>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT timestamp, open, high, low, close, volume, vwap, transactions
                 FROM price_data WHERE ticker = ?1 ORDER BY date ASC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![ticker.as_str()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, Option<f64>>(6)?,
                    row.get::<_, Option<i64>>(7)?,
                ))
            })
            .map_err(db_err)?;

        rows.map(|row| -> Result<PriceBar> {
            let (millis, open, high, low, close, volume, vwap, transactions) =
                row.map_err(db_err)?;
            let timestamp = DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| EltError::Parse(format!("Invalid timestamp {millis}")))?;
            Ok(PriceBar {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
                vwap,
                transactions: transactions.and_then(|t| u64::try_from(t).ok()),
            })
        })
        .collect()
    }

    /// Stored bars for a ticker as a DataFrame
    /// (`date`, `open`, `high`, `low`, `close`, `volume`, `vwap`).
    pub fn price_frame(&self, ticker: &Symbol) -> Result<DataFrame> {
        let bars = self.price_bars(ticker)?;
        let dates: Vec<String> = bars.iter().map(|b| b.date().to_string()).collect();
        let column = |f: fn(&PriceBar) -> f64| -> Vec<f64> { bars.iter().map(f).collect() };

        let df = DataFrame::new(vec![
            Column::new("date".into(), dates),
            Column::new("open".into(), column(|b| b.open)),
            Column::new("high".into(), column(|b| b.high)),
            Column::new("low".into(), column(|b| b.low)),
            Column::new("close".into(), column(|b| b.close)),
            Column::new("volume".into(), column(|b| b.volume)),
            Column::new(
                "vwap".into(),
                bars.iter().map(|b| b.vwap).collect::<Vec<Option<f64>>>(),
            ),
        ])
        .map_err(db_err)?;

        df.lazy()
            .with_column(col("date").cast(DataType::Date))
            .collect()
            .map_err(db_err)
    }

    /// Number of rows in a warehouse table.
    pub fn row_count(&self, table: &str) -> Result<usize> {
        const TABLES: &[&str] = &[
            "company_details",
            "price_data",
            "treasury_curves",
            "sic_codes",
            "naics_codes",
            "sic_to_naics",
        ];
        if !TABLES.contains(&table) {
            return Err(EltError::InvalidParameter(format!("Unknown table: {table}")));
        }
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[async_trait]
impl Warehouse for SqliteWarehouse {
    #[instrument(skip(self, details), fields(rows = details.len()))]
    async fn upsert_company_details(&self, details: &[CompanyDetails]) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(db_err)?;

        for d in details {
            tx.execute(
                "INSERT INTO company_details
                 (ticker, name, market_cap, active, composite_figi, base_currency, list_date,
                  primary_exchange, shares_outstanding, total_employees, sic_code)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT (ticker) DO UPDATE SET
                    name = excluded.name,
                    market_cap = excluded.market_cap,
                    active = excluded.active,
                    composite_figi = excluded.composite_figi,
                    base_currency = excluded.base_currency,
                    list_date = excluded.list_date,
                    primary_exchange = excluded.primary_exchange,
                    shares_outstanding = excluded.shares_outstanding,
                    total_employees = excluded.total_employees,
                    sic_code = excluded.sic_code",
                params![
                    d.ticker.as_str(),
                    d.name,
                    d.market_cap,
                    d.active,
                    d.composite_figi,
                    d.base_currency,
                    d.list_date.map(|date| date.to_string()),
                    d.primary_exchange,
                    d.shares_outstanding,
                    d.total_employees,
                    d.sic_code,
                ],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)?;
        debug!("Upserted company details");
        Ok(details.len())
    }

    #[instrument(skip(self, bars), fields(symbol = %symbol, bars = bars.len()))]
    async fn upsert_price_bars(&self, symbol: &Symbol, bars: &[PriceBar]) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(db_err)?;

        for bar in bars {
            tx.execute(
                "INSERT INTO price_data
                 (ticker, date, timestamp, open, high, low, close, volume, vwap, transactions)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT (ticker, date) DO UPDATE SET
                    timestamp = excluded.timestamp,
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume,
                    vwap = excluded.vwap,
                    transactions = excluded.transactions",
                params![
                    symbol.as_str(),
                    bar.date().to_string(),
                    bar.timestamp.timestamp_millis(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                    bar.vwap,
                    bar.transactions.and_then(|t| i64::try_from(t).ok()),
                ],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)?;
        debug!("Upserted price bars");
        Ok(bars.len())
    }

    #[instrument(skip(self, points), fields(rows = points.len()))]
    async fn upsert_treasury_curve(&self, points: &[TreasuryCurvePoint]) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(db_err)?;

        for p in points {
            tx.execute(
                "INSERT INTO treasury_curves
                 (date, dgs1mo, dgs3mo, dgs6mo, dgs1, dgs2, dgs5, dgs10, dgs30)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT (date) DO UPDATE SET
                    dgs1mo = excluded.dgs1mo,
                    dgs3mo = excluded.dgs3mo,
                    dgs6mo = excluded.dgs6mo,
                    dgs1 = excluded.dgs1,
                    dgs2 = excluded.dgs2,
                    dgs5 = excluded.dgs5,
                    dgs10 = excluded.dgs10,
                    dgs30 = excluded.dgs30",
                params![
                    p.date.to_string(),
                    p.dgs1mo,
                    p.dgs3mo,
                    p.dgs6mo,
                    p.dgs1,
                    p.dgs2,
                    p.dgs5,
                    p.dgs10,
                    p.dgs30,
                ],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)?;
        debug!("Upserted treasury curve");
        Ok(points.len())
    }

    async fn replace_sic_codes(&self, codes: &[SicCode]) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(db_err)?;
        tx.execute("DELETE FROM sic_codes", []).map_err(db_err)?;

        let mut inserted = 0;
        for c in codes {
            inserted += tx
                .execute(
                    "INSERT OR IGNORE INTO sic_codes (sic_code, office, industry)
                     VALUES (?1, ?2, ?3)",
                    params![c.code, c.office, c.industry],
                )
                .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)?;
        info!(rows = inserted, "Loaded SIC codes");
        Ok(inserted)
    }

    async fn replace_naics_codes(&self, codes: &[NaicsCode]) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(db_err)?;
        tx.execute("DELETE FROM naics_codes", []).map_err(db_err)?;

        let mut inserted = 0;
        for c in codes {
            inserted += tx
                .execute(
                    "INSERT OR IGNORE INTO naics_codes (naics_code, description)
                     VALUES (?1, ?2)",
                    params![c.code, c.description],
                )
                .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)?;
        info!(rows = inserted, "Loaded NAICS codes");
        Ok(inserted)
    }

    async fn replace_sic_to_naics(&self, mappings: &[SicNaicsMapping]) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(db_err)?;
        tx.execute("DELETE FROM sic_to_naics", []).map_err(db_err)?;

        let mut inserted = 0;
        for m in mappings {
            inserted += tx
                .execute(
                    "INSERT OR IGNORE INTO sic_to_naics
                     (sic_code, sic_description, naics_code, naics_description)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![m.sic_code, m.sic_description, m.naics_code, m.naics_description],
                )
                .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)?;
        info!(rows = inserted, "Loaded SIC to NAICS crosswalk");
        Ok(inserted)
    }

    async fn classified_tickers(&self) -> Result<Vec<Symbol>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT c.ticker FROM company_details c
                 JOIN sic_codes s ON c.sic_code = s.sic_code
                 ORDER BY c.ticker",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?;

        rows.map(|row| row.map(Symbol::from).map_err(db_err)).collect()
    }
}
