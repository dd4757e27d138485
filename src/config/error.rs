//! Configuration error types.

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// An environment variable was set but could not be parsed.
    #[error("failed to parse {var}='{value}': {reason}")]
    ParseError {
        var: &'static str,
        value: String,
        reason: String,
    },

    /// Values parsed fine but are inconsistent.
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
