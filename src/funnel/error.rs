use thiserror::Error;

use crate::model::IncentiveId;
use crate::store::StoreError;

/// Errors that end a funnel run without persisting anything new.
///
/// Provider trouble is not in here: it degrades a stage and shows up in
/// [`super::MatchDiagnostics::fallback_reasons`] instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
    #[error("incentive {0} not found")]
    IncentiveNotFound(IncentiveId),

    #[error("record store error: {0}")]
    Store(#[from] StoreError),
}
