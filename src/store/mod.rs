//! Relational-store collaborator.
//!
//! The engine only needs keyed reads and one atomic write: replacing the complete
//! match list of an incentive. [`InMemoryStore`] is the reference implementation.

mod error;
mod memory;


pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;

use async_trait::async_trait;

use crate::ledger::InferenceCallRecord;
use crate::model::{Company, Incentive, IncentiveId, Match, MatchSet};

#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn get_incentive(&self, id: IncentiveId) -> StoreResult<Option<Incentive>>;

    async fn list_incentives(&self) -> StoreResult<Vec<Incentive>>;

    /// Active companies in a stable order.
    async fn list_active_companies(&self) -> StoreResult<Vec<Company>>;

    /// Replaces every stored match of `incentive_id` with `matches`, all or nothing.
    async fn replace_matches(
        &self,
        incentive_id: IncentiveId,
        matches: MatchSet,
    ) -> StoreResult<()>;

    /// Current matches ordered by rank.
    async fn matches_for(&self, incentive_id: IncentiveId) -> StoreResult<Vec<Match>>;

    async fn append_call_records(&self, records: &[InferenceCallRecord]) -> StoreResult<()>;
}
