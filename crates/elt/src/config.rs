//! Environment-based configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, warn};

use elt_core::{EltError, Result};

use crate::extractor::ExtractorConfig;

/// Default checkpoint file for price extraction.
pub const DEFAULT_CHECKPOINT_PATH: &str = "checkpoints/price_extraction.json";

/// Default destination for downloaded fundamentals.
pub const DEFAULT_FUNDAMENTALS_PATH: &str = "data/fundamentals";

/// Dotenv files read by [`EltConfig::from_env`], in order. Earlier files win.
pub const ENV_FILES: &[&str] = &["./secret/.env", ".env"];

/// Pipeline settings read from the environment.
///
/// API keys stay optional here; the accessor for a key fails with
/// [`EltError::Configuration`] only when a command actually needs it.
#[derive(Clone)]
pub struct EltConfig {
    /// Polygon.io key (`POLYGON_API_KEY`, falling back to `API_KEY`).
    pub polygon_api_key: Option<String>,
    /// FRED key (`FRED_KEY`).
    pub fred_api_key: Option<String>,
    /// Alpha Vantage key (`ALPHA_VANTAGE_KEY`).
    pub alpha_vantage_api_key: Option<String>,
    /// Warehouse database file (`DB_PATH`).
    pub db_path: Option<PathBuf>,
    /// Fundamentals output directory (`FUNDAMENTALS_DATA_PATH`).
    pub fundamentals_path: PathBuf,
    /// Price extraction checkpoint (`CHECKPOINT_PATH`).
    pub checkpoint_path: PathBuf,
    /// Batch size, retries and delays (`EXTRACT_*`).
    pub extractor: ExtractorConfig,
}

impl fmt::Debug for EltConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("EltConfig")
            .field("polygon_api_key", &redact(&self.polygon_api_key))
            .field("fred_api_key", &redact(&self.fred_api_key))
            .field("alpha_vantage_api_key", &redact(&self.alpha_vantage_api_key))
            .field("db_path", &self.db_path)
            .field("fundamentals_path", &self.fundamentals_path)
            .field("checkpoint_path", &self.checkpoint_path)
            .field("extractor", &self.extractor)
            .finish()
    }
}

impl EltConfig {
    /// Load dotenv files, then read the process environment.
    pub fn from_env() -> Self {
        for file in ENV_FILES {
            match dotenvy::from_filename(file) {
                Ok(path) => debug!(path = %path.display(), "Loaded environment file"),
                Err(e) if e.not_found() => {}
                Err(e) => warn!(file, error = %e, "Failed to load environment file"),
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = ExtractorConfig::default();

        let extractor = ExtractorConfig::default()
            .with_batch_size(parse_or(&var, "EXTRACT_BATCH_SIZE", defaults.batch_size))
            .with_max_retries(parse_or(&var, "EXTRACT_MAX_RETRIES", defaults.max_retries))
            .with_retry_delay(Duration::from_secs(parse_or(
                &var,
                "EXTRACT_RETRY_DELAY_SECS",
                defaults.retry_delay.as_secs(),
            )))
            .with_batch_delay(Duration::from_secs(parse_or(
                &var,
                "EXTRACT_BATCH_DELAY_SECS",
                defaults.batch_delay.as_secs(),
            )));

        Self {
            polygon_api_key: var("POLYGON_API_KEY").or_else(|| var("API_KEY")),
            fred_api_key: var("FRED_KEY"),
            alpha_vantage_api_key: var("ALPHA_VANTAGE_KEY"),
            db_path: var("DB_PATH").map(PathBuf::from),
            fundamentals_path: var("FUNDAMENTALS_DATA_PATH")
                .map_or_else(|| PathBuf::from(DEFAULT_FUNDAMENTALS_PATH), PathBuf::from),
            checkpoint_path: var("CHECKPOINT_PATH")
                .map_or_else(|| PathBuf::from(DEFAULT_CHECKPOINT_PATH), PathBuf::from),
            extractor,
        }
    }

    /// Polygon.io key, or a configuration error naming the variable.
    pub fn polygon_api_key(&self) -> Result<&str> {
        required(self.polygon_api_key.as_deref(), "POLYGON_API_KEY")
    }

    /// FRED key, or a configuration error naming the variable.
    pub fn fred_api_key(&self) -> Result<&str> {
        required(self.fred_api_key.as_deref(), "FRED_KEY")
    }

    /// Alpha Vantage key, or a configuration error naming the variable.
    pub fn alpha_vantage_api_key(&self) -> Result<&str> {
        required(self.alpha_vantage_api_key.as_deref(), "ALPHA_VANTAGE_KEY")
    }

    /// Warehouse path, or a configuration error naming the variable.
    pub fn db_path(&self) -> Result<&Path> {
        self.db_path
            .as_deref()
            .ok_or_else(|| EltError::Configuration("DB_PATH is not set".to_string()))
    }
}

fn required<'a>(value: Option<&'a str>, key: &str) -> Result<&'a str> {
    value.ok_or_else(|| EltError::Configuration(format!("{key} is not set")))
}

/// Parse a variable, falling back to `default` when unset or invalid.
fn parse_or<T, F>(var: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Ignoring invalid value");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> EltConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        EltConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.checkpoint_path, PathBuf::from(DEFAULT_CHECKPOINT_PATH));
        assert_eq!(config.fundamentals_path, PathBuf::from(DEFAULT_FUNDAMENTALS_PATH));
        assert_eq!(config.extractor, ExtractorConfig::default());
        assert!(matches!(config.polygon_api_key(), Err(EltError::Configuration(_))));
        assert!(matches!(config.db_path(), Err(EltError::Configuration(_))));
    }

    #[test]
    fn test_polygon_key_fallback() {
        assert_eq!(config(&[("API_KEY", "legacy")]).polygon_api_key().unwrap(), "legacy");
        assert_eq!(
            config(&[("API_KEY", "legacy"), ("POLYGON_API_KEY", "new")])
                .polygon_api_key()
                .unwrap(),
            "new"
        );
    }

    #[test]
    fn test_extractor_overrides() {
        let config = config(&[
            ("EXTRACT_BATCH_SIZE", "10"),
            ("EXTRACT_MAX_RETRIES", "0"),
            ("EXTRACT_RETRY_DELAY_SECS", "2"),
            ("EXTRACT_BATCH_DELAY_SECS", " 12 "),
            ("DB_PATH", "warehouse.db"),
        ]);
        assert_eq!(config.extractor.batch_size, 10);
        assert_eq!(config.extractor.max_retries, 1);
        assert_eq!(config.extractor.retry_delay, Duration::from_secs(2));
        assert_eq!(config.extractor.batch_delay, Duration::from_secs(12));
        assert_eq!(config.db_path().unwrap(), Path::new("warehouse.db"));
    }

    #[test]
    fn test_invalid_numbers_use_defaults() {
        let config = config(&[("EXTRACT_BATCH_SIZE", "five"), ("FRED_KEY", "  ")]);
        assert_eq!(config.extractor.batch_size, 5);
        assert!(config.fred_api_key.is_none());
    }

    #[test]
    fn test_debug_redacts_keys() {
        let config = config(&[("FRED_KEY", "secret_fred_key")]);
        let debug_str = format!("{config:?}");
        assert!(!debug_str.contains("secret_fred_key"));
        assert!(debug_str.contains("[REDACTED]"));
    }
}
