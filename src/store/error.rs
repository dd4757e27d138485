use thiserror::Error;

use crate::model::IncentiveId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("incentive not found: {0}")]
    IncentiveNotFound(IncentiveId),

    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error("record store write failed: {0}")]
    WriteFailed(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
