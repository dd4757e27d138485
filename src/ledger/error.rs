use std::sync::Arc;

use thiserror::Error;

use crate::provider::ProviderError;

/// Why the ledger could not produce a response.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    /// The provider kept failing (or failed with a non-retryable error).
    #[error("provider call failed after {attempts} attempt(s): {source}")]
    Provider {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    /// Control signal: the spend ceiling is reached, no new paid calls are made.
    #[error("spend ceiling ${ceiling:.4} reached (spent ${spent:.4})")]
    BudgetExceeded { spent: f64, ceiling: f64 },
}

impl InferenceError {
    pub fn is_budget(&self) -> bool {
        matches!(self, InferenceError::BudgetExceeded { .. })
    }

    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            InferenceError::Provider { source, .. } => Some(source),
            InferenceError::BudgetExceeded { .. } => None,
        }
    }
}

// Callers waiting on an in-flight identical request share the first caller's error.
impl From<Arc<InferenceError>> for InferenceError {
    fn from(err: Arc<InferenceError>) -> Self {
        (*err).clone()
    }
}

pub type InferenceResult<T> = Result<T, InferenceError>;
