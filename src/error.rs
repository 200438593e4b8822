//! Crate error types.

use thiserror::Error;

/// Errors raised while building or configuring gatehouse components.
///
/// Runtime lookup and store failures never appear here. Verification
/// failures classify the request downward and store failures fall back
/// to local state, so only construction and configuration can fail.
#[derive(Debug, Error)]
pub enum GatehouseError {
    /// Configuration file could not be read.
    #[error("failed to read config file: {0}")]
    ConfigRead(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("failed to parse config file '{path}': {message}")]
    ConfigParse { path: String, message: String },

    /// Configuration file extension is not a supported format.
    #[error("unsupported config format '{0}', expected .yaml, .yml, or .json")]
    ConfigFormat(String),

    /// Outbound HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Listen address could not be parsed.
    #[error("invalid bind address '{0}'")]
    BindAddr(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GatehouseError>;
