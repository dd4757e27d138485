use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{FunnelStage, FusionWeights, StagePath};
use crate::constants::{
    DEFAULT_DETERMINISTIC_NORMALIZER, DEFAULT_LLM_CANDIDATES, DEFAULT_MIN_SIMILARITY,
    DEFAULT_RETRIEVE_TOP_K, DEFAULT_SELECT_COUNT, DEFAULT_WORKERS,
};
use crate::model::{IncentiveId, Match};
use crate::scoring::ScoreWeights;

/// Stage sizes and scoring policy of a [`super::MatchingEngine`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FunnelSettings {
    pub retrieve_top_k: usize,
    pub min_similarity: f32,
    /// K.
    pub llm_candidates: usize,
    /// M.
    pub select_count: usize,
    pub weights: FusionWeights,
    pub deterministic_normalizer: f32,
    pub score_weights: ScoreWeights,
    pub workers: usize,
}

impl Default for FunnelSettings {
    fn default() -> Self {
        Self {
            retrieve_top_k: DEFAULT_RETRIEVE_TOP_K,
            min_similarity: DEFAULT_MIN_SIMILARITY,
            llm_candidates: DEFAULT_LLM_CANDIDATES,
            select_count: DEFAULT_SELECT_COUNT,
            weights: FusionWeights::default(),
            deterministic_normalizer: DEFAULT_DETERMINISTIC_NORMALIZER,
            score_weights: ScoreWeights::default(),
            workers: DEFAULT_WORKERS,
        }
    }
}

/// What happened inside one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDiagnostics {
    pub run_id: Uuid,
    pub path: StagePath,
    /// Stage 1 neighbours that mapped to an active company.
    pub retrieved: usize,
    pub scored: usize,
    pub sent_to_llm: usize,
    pub selected: usize,
    /// Model entries that matched no candidate.
    pub dropped_selections: usize,
    /// Selections whose eligibility claim was contradicted and penalized.
    pub contradicted: usize,
    pub fallback_reasons: Vec<String>,
    pub run_spend_usd: f64,
    pub provider_calls: u64,
    pub cache_hits: u64,
}

impl MatchDiagnostics {
    pub(crate) fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            path: StagePath::new(),
            retrieved: 0,
            scored: 0,
            sent_to_llm: 0,
            selected: 0,
            dropped_selections: 0,
            contradicted: 0,
            fallback_reasons: Vec::new(),
            run_spend_usd: 0.0,
            provider_calls: 0,
            cache_hits: 0,
        }
    }

    /// `true` when any stage ran in a fallback mode.
    pub fn is_degraded(&self) -> bool {
        !self.fallback_reasons.is_empty()
    }

    pub fn used_semantic_retrieval(&self) -> bool {
        self.path.contains(FunnelStage::Retrieve)
    }

    pub fn used_llm_fallback(&self) -> bool {
        self.path.contains(FunnelStage::ErrorFallback)
    }
}

/// Output of [`super::MatchingEngine::match_incentive`]: the persisted list plus
/// diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub incentive_id: IncentiveId,
    /// Ranked `1..=n`, exactly what was written to the store.
    pub matches: Vec<Match>,
    pub diagnostics: MatchDiagnostics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchFailure {
    pub incentive_id: IncentiveId,
    pub error: String,
}

/// Aggregate of one [`super::MatchingEngine::match_all`] batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchAllSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped_by_budget: usize,
    /// Succeeded runs that used any fallback.
    pub degraded: usize,
    /// Ledger spend during the batch.
    pub total_spend_usd: f64,
    pub failures: Vec<MatchFailure>,
    pub skipped: Vec<IncentiveId>,
    /// Successful runs in batch order.
    pub results: Vec<MatchResult>,
}

impl MatchAllSummary {
    pub fn halted_by_budget(&self) -> bool {
        self.skipped_by_budget > 0
    }
}

/// Counts from [`super::MatchingEngine::index_companies`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub indexed: usize,
    /// Companies with no embeddable text.
    pub skipped: usize,
    pub failed: usize,
}
