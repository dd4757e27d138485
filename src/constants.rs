//! Cross-cutting, shared constants.
//!
//! Funnel defaults live here so that config, scorer, selector and engine agree on them.
//! None of the fusion or penalty values are load-bearing; they are starting points
//! that [`crate::config::Config`] can override.

/// Embedding dimension of `text-embedding-3-small`.
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;

/// Stage 1: how many nearest neighbours to pull from the vector index.
pub const DEFAULT_RETRIEVE_TOP_K: usize = 50;
/// Stage 1: similarity floor below which a neighbour is not a candidate.
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.2;
/// Stage 2 -> 3: how many scored candidates are shown to the model (K).
pub const DEFAULT_LLM_CANDIDATES: usize = 15;
/// Stage 3: how many matches the model must select (M).
pub const DEFAULT_SELECT_COUNT: usize = 5;

pub const DEFAULT_WEIGHT_SEMANTIC: f32 = 0.3;
pub const DEFAULT_WEIGHT_DETERMINISTIC: f32 = 0.4;
pub const DEFAULT_WEIGHT_LLM: f32 = 0.3;

/// Deterministic totals are divided by this and capped at 1.0 before fusion.
pub const DEFAULT_DETERMINISTIC_NORMALIZER: f32 = 200.0;

pub const DEFAULT_CLAIM_PENALTY: f32 = 0.3;
pub const DEFAULT_CLAIM_PENALTY_FLOOR: f32 = 0.1;

/// Max reasons kept per model selection.
pub const MAX_LLM_REASONS: usize = 3;

pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_LLM_MAX_TOKENS: u32 = 2000;
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// Runtime dimension check used at the index boundary.
pub fn validate_embedding_dim(expected: usize, actual: usize) -> Result<(), DimValidationError> {
    if expected == 0 {
        return Err(DimValidationError::ZeroDimension);
    }
    if actual != expected {
        return Err(DimValidationError::Mismatch { expected, actual });
    }
    Ok(())
}

/// Errors returned by [`validate_embedding_dim`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DimValidationError {
    #[error("embedding dimension cannot be zero")]
    ZeroDimension,

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    Mismatch { expected: usize, actual: usize },
}
