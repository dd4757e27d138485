use uuid::Uuid;

use super::{
    CachedText, CachedVector, CallContext, InferenceCallRecord, InferenceLedger, InferenceResult,
    LedgerResponse, LedgerStats, OperationKind,
};
use crate::embedding::EmbeddingProvider;
use crate::hashing::RequestKey;
use crate::model::IncentiveId;
use crate::provider::{CompletionRequest, LlmProvider};

/// The ledger as seen by one funnel run.
#[derive(Debug, Clone, Copy)]
pub struct LedgerScope<'a> {
    ledger: &'a InferenceLedger,
    incentive_id: IncentiveId,
    run_id: Uuid,
}

impl<'a> LedgerScope<'a> {
    pub(super) fn new(
        ledger: &'a InferenceLedger,
        incentive_id: IncentiveId,
        run_id: Uuid,
    ) -> Self {
        Self {
            ledger,
            incentive_id,
            run_id,
        }
    }

    pub fn ledger(&self) -> &'a InferenceLedger {
        self.ledger
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn context(&self, kind: OperationKind) -> CallContext {
        CallContext {
            kind,
            incentive_id: Some(self.incentive_id),
            run_id: Some(self.run_id),
        }
    }

    pub async fn embed<E: EmbeddingProvider>(
        &self,
        provider: &E,
        text: &str,
        kind: OperationKind,
    ) -> InferenceResult<LedgerResponse<CachedVector>> {
        self.ledger.embed(provider, text, self.context(kind)).await
    }

    pub async fn complete<P: LlmProvider>(
        &self,
        provider: &P,
        request: &CompletionRequest,
    ) -> InferenceResult<LedgerResponse<CachedText>> {
        self.ledger
            .complete(provider, request, self.context(OperationKind::BatchMatch))
            .await
    }

    pub async fn reject_completion(&self, key: &RequestKey, model: &str, raw: &str, reason: &str) {
        self.ledger
            .reject_completion(key, model, raw, reason, self.context(OperationKind::BatchMatch))
            .await
    }

    pub fn records(&self) -> Vec<InferenceCallRecord> {
        self.ledger.records_for_run(self.run_id)
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats::from_records(self.records().iter())
    }
}
