use std::time::Duration;

use thiserror::Error;

/// Failure of one external model call.
///
/// Callers receive this as a value and pick their own fallback; nothing here is
/// fatal on its own.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// Network-level failure (DNS, connect, reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// The call did not finish within the configured timeout.
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    /// Provider asked us to slow down.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Non-success HTTP status.
    #[error("provider returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// Response arrived but could not be decoded.
    #[error("malformed provider response: {0}")]
    Malformed(String),

    /// Provider is not configured or refused the model.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport(_)
            | ProviderError::Timeout(_)
            | ProviderError::RateLimited(_) => true,
            ProviderError::Status { status, .. } => *status >= 500,
            ProviderError::Malformed(_) | ProviderError::Unavailable(_) => false,
        }
    }

    /// Short label for log fields and ledger records.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Transport(_) => "transport",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::RateLimited(_) => "rate_limited",
            ProviderError::Status { .. } => "status",
            ProviderError::Malformed(_) => "malformed",
            ProviderError::Unavailable(_) => "unavailable",
        }
    }

    pub(crate) fn from_status(status: u16, message: String) -> Self {
        if status == 429 {
            ProviderError::RateLimited(message)
        } else {
            ProviderError::Status { status, message }
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ProviderError::Timeout(Duration::ZERO);
        }
        if let Some(status) = err.status() {
            return ProviderError::from_status(status.as_u16(), err.to_string());
        }
        if err.is_decode() {
            return ProviderError::Malformed(err.to_string());
        }
        ProviderError::Transport(err.to_string())
    }
}
