//! Unified error types for the scanner and projection engine.
//!
//! Missing prices or order books are never errors here: the detector returns
//! nothing and the estimator returns `None`. Errors are reserved for transport
//! failures, malformed solver inputs, and bad configuration.

use thiserror::Error;

/// Unified error type for the scanner.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Configuration validation error.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// Market catalog or order book error.
    #[error("market error: {0}")]
    Market(#[from] MarketError),

    /// Projection solver error.
    #[error("solver error: {0}")]
    Solver(#[from] SolverError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Market catalog and order book retrieval errors.
#[derive(Error, Debug)]
pub enum MarketError {
    /// Failed to fetch a catalog page or order book.
    #[error("failed to fetch {resource}: {reason}")]
    FetchFailed {
        /// What was being fetched (endpoint or token id).
        resource: String,
        /// Reason for failure.
        reason: String,
    },

    /// The API answered with an error payload.
    #[error("api returned error for {resource}: {message}")]
    ApiError {
        /// What was being fetched.
        resource: String,
        /// Error message from the payload.
        message: String,
    },

    /// Failed to parse market data.
    #[error("failed to parse market data: {0}")]
    ParseError(String),

    /// Base URL could not be joined with an endpoint path.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP request failed.
    #[error("http request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Projection and extraction solver errors.
///
/// Non-convergence is not an error: it is reported through the result's
/// success flag alongside the best iterate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    /// Constraint system does not match the price vector.
    #[error("dimension mismatch: {what} expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Which quantity disagreed.
        what: &'static str,
        /// Expected size.
        expected: usize,
        /// Actual size.
        actual: usize,
    },

    /// The blocking worker running a solve panicked or was cancelled.
    #[error("solver worker failed: {0}")]
    WorkerFailed(String),
}

/// Configuration validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A numeric parameter is outside its allowed range.
    #[error("{name} out of range: {value} (expected {expected})")]
    OutOfRange {
        /// Environment variable name.
        name: &'static str,
        /// Offending value, rendered.
        value: String,
        /// Allowed range, rendered.
        expected: &'static str,
    },
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, AppError>;
