use thiserror::Error;

use crate::constants::DimValidationError;

#[derive(Debug, Error)]
pub enum VectorIndexError {
    #[error("failed to connect to Qdrant at '{url}': {message}")]
    ConnectionFailed { url: String, message: String },

    #[error("failed to prepare collection '{collection}': {message}")]
    CollectionFailed { collection: String, message: String },

    #[error("failed to upsert into '{collection}': {message}")]
    UpsertFailed { collection: String, message: String },

    #[error("failed to search '{collection}': {message}")]
    SearchFailed { collection: String, message: String },

    #[error(transparent)]
    Dimension(#[from] DimValidationError),
}

pub type VectorIndexResult<T> = Result<T, VectorIndexError>;
