//! Error types for pipeline operations.
//!
//! This module defines [`EltError`] which covers all error cases that can occur
//! when extracting data from upstream APIs, checkpointing progress, or loading
//! records into the warehouse.

use thiserror::Error;

/// Errors that can occur during pipeline operations.
#[derive(Error, Debug)]
pub enum EltError {
    /// Network-related errors (connection failures, timeouts, 5xx, etc.).
    #[error("Network error: {0}")]
    Network(String),

    /// Rate limit exceeded by a provider.
    #[error("Rate limited by {provider}: retry after {retry_after:?}")]
    RateLimited {
        /// The provider that rate limited the request.
        provider: String,
        /// Suggested time to wait before retrying.
        retry_after: Option<std::time::Duration>,
    },

    /// The requested symbol was not found.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// Data is not available for the requested symbol and date range.
    #[error("Data not available for {symbol} in range {start} to {end}")]
    DataNotAvailable {
        /// The symbol that was requested.
        symbol: String,
        /// Start of the requested date range.
        start: String,
        /// End of the requested date range.
        end: String,
    },

    /// Error parsing data from a provider or a local file.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Error reading or writing a checkpoint.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Error interacting with the warehouse.
    #[error("Warehouse error: {0}")]
    Warehouse(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Required configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested provider is not configured.
    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Authentication failed for a provider.
    #[error("Authentication failed for provider {0}")]
    AuthenticationFailed(String),

    /// The run was interrupted by an external signal.
    #[error("Interrupted: {0}")]
    Interrupted(String),
}

impl EltError {
    /// Returns true if this error represents an operator interruption.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }
}

/// Result type alias using [`EltError`].
pub type Result<T> = std::result::Result<T, EltError>;
