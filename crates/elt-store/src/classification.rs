//! Readers for the SIC, NAICS and SIC to NAICS lookup files.
//!
//! Files are read with polars from CSV (`.csv`, `.txt`) or parquet
//! (`.parquet`). Rows whose code does not parse as an integer (NAICS sector
//! ranges such as `31-33`, blank trailer rows) are skipped.

use elt_core::{EltError, NaicsCode, Result, SicCode, SicNaicsMapping};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SIC_CODE: &str = "SIC Code";
const SIC_OFFICE: &str = "Office";
const SIC_INDUSTRY: &str = "Industry Title";

const NAICS_CODE: &str = "2022 NAICS US Code";
const NAICS_TITLE: &str = "2022 NAICS US Title";

const CROSSWALK_SIC_CODE: &str = "SIC Code";
const CROSSWALK_SIC_DESCRIPTION: &str = "SIC_Description";
const CROSSWALK_NAICS_CODE: &str = "NAICS Code";
const CROSSWALK_NAICS_DESCRIPTION: &str = "NAICS_Description";

/// All three classification tables, ready to load into a warehouse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationTables {
    /// SIC lookup rows.
    pub sic_codes: Vec<SicCode>,
    /// NAICS lookup rows.
    pub naics_codes: Vec<NaicsCode>,
    /// SIC to NAICS crosswalk rows.
    pub sic_to_naics: Vec<SicNaicsMapping>,
}

impl ClassificationTables {
    /// Read the three lookup files.
    ///
    /// # Errors
    /// Returns an error if any file is missing, has an unsupported extension
    /// or lacks a required column.
    pub fn read(sic: &Path, naics: &Path, crosswalk: &Path) -> Result<Self> {
        let tables = Self {
            sic_codes: read_sic_codes(sic)?,
            naics_codes: read_naics_codes(naics)?,
            sic_to_naics: read_sic_to_naics(crosswalk)?,
        };
        info!(
            sic = tables.sic_codes.len(),
            naics = tables.naics_codes.len(),
            crosswalk = tables.sic_to_naics.len(),
            "Read classification tables"
        );
        Ok(tables)
    }
}

/// Read the SIC lookup file (`SIC Code`, `Office`, `Industry Title`).
pub fn read_sic_codes(path: &Path) -> Result<Vec<SicCode>> {
    let df = read_frame(path)?;
    let codes = int_column(&df, SIC_CODE)?;
    let offices = str_column(&df, SIC_OFFICE)?;
    let industries = str_column(&df, SIC_INDUSTRY)?;

    Ok(codes
        .into_iter()
        .zip(offices)
        .zip(industries)
        .filter_map(|((code, office), industry)| {
            Some(SicCode {
                code: code?,
                office: office.unwrap_or_default(),
                industry: industry.unwrap_or_default(),
            })
        })
        .collect())
}

/// Read the NAICS lookup file (`2022 NAICS US Code`, `2022 NAICS US Title`).
pub fn read_naics_codes(path: &Path) -> Result<Vec<NaicsCode>> {
    let df = read_frame(path)?;
    let codes = int_column(&df, NAICS_CODE)?;
    let titles = str_column(&df, NAICS_TITLE)?;

    Ok(codes
        .into_iter()
        .zip(titles)
        .filter_map(|(code, title)| {
            Some(NaicsCode {
                code: code?,
                description: title.unwrap_or_default().trim().to_string(),
            })
        })
        .collect())
}

/// Read the SIC to NAICS crosswalk
/// (`SIC Code`, `SIC_Description`, `NAICS Code`, `NAICS_Description`).
pub fn read_sic_to_naics(path: &Path) -> Result<Vec<SicNaicsMapping>> {
    let df = read_frame(path)?;
    let sic_codes = int_column(&df, CROSSWALK_SIC_CODE)?;
    let sic_descriptions = str_column(&df, CROSSWALK_SIC_DESCRIPTION)?;
    let naics_codes = int_column(&df, CROSSWALK_NAICS_CODE)?;
    let naics_descriptions = str_column(&df, CROSSWALK_NAICS_DESCRIPTION)?;

    Ok(sic_codes
        .into_iter()
        .zip(sic_descriptions)
        .zip(naics_codes.into_iter().zip(naics_descriptions))
        .filter_map(|((sic, sic_description), (naics, naics_description))| {
            Some(SicNaicsMapping {
                sic_code: sic?,
                sic_description: sic_description.unwrap_or_default(),
                naics_code: naics?,
                naics_description: naics_description.unwrap_or_default(),
            })
        })
        .collect())
}

/// Read a CSV or parquet file into a DataFrame, keyed by extension.
pub fn read_frame(path: &Path) -> Result<DataFrame> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let df = match extension.as_str() {
        "csv" | "txt" => CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(PathBuf::from(path)))
            .and_then(|reader| reader.finish())
            .map_err(|e| EltError::Parse(format!("{}: {e}", path.display())))?,
        "parquet" => {
            let file = File::open(path)?;
            ParquetReader::new(file)
                .finish()
                .map_err(|e| EltError::Parse(format!("{}: {e}", path.display())))?
        }
        other => {
            return Err(EltError::InvalidParameter(format!(
                "Unsupported classification file type '{other}': {}",
                path.display()
            )));
        }
    };

    debug!(path = %path.display(), rows = df.height(), "Read classification file");
    Ok(df)
}

fn missing_column(name: &str, e: PolarsError) -> EltError {
    EltError::Parse(format!("Column '{name}': {e}"))
}

fn int_column(df: &DataFrame, name: &str) -> Result<Vec<Option<i32>>> {
    let column = df
        .column(name)
        .and_then(|c| c.cast(&DataType::Int32))
        .map_err(|e| missing_column(name, e))?;
    let values = column.i32().map_err(|e| missing_column(name, e))?;
    Ok(values.into_iter().collect())
}

fn str_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .and_then(|c| c.cast(&DataType::String))
        .map_err(|e| missing_column(name, e))?;
    let values = column.str().map_err(|e| missing_column(name, e))?;
    Ok(values
        .into_iter()
        .map(|v| v.map(ToString::to_string))
        .collect())
}
