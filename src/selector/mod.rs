//! LLM batch selector (funnel stage 3).
//!
//! One prompt carries all K candidates; the model must pick exactly `min(M, K)`.
//! Its answer is parsed defensively, mapped back onto the candidates, and every
//! eligibility claim is checked against the incentive's real code set before the
//! scores are trusted. Anything unusable (provider failure, unparsable text, wrong
//! arity) turns into a deterministic fallback instead of an error.

mod error;
pub mod fuzzy;
pub mod parse;
pub mod prompt;
pub mod validate;


pub use error::SelectorError;
pub use parse::{RawSelection, parse_selections};
pub use prompt::build_prompt;
pub use validate::{ClaimPenalty, ValidatedReasons, validate_claims};

use std::fmt;

use tracing::{debug, info, instrument, warn};

use crate::constants::{
    DEFAULT_LLM_MAX_TOKENS, DEFAULT_LLM_MODEL, DEFAULT_SELECT_COUNT, MAX_LLM_REASONS,
};
use crate::ledger::LedgerScope;
use crate::model::{Company, CompanyId, Incentive};
use crate::provider::{CompletionRequest, LlmProvider};

/// Reason attached to a candidate added from the deterministic order because a
/// model selection could not be mapped.
pub const TOP_UP_REASON: &str = "Added from deterministic ranking (model selection unmatched)";

#[derive(Debug, Clone)]
pub struct SelectorConfig {
    pub model: String,
    pub max_tokens: u32,
    /// M.
    pub select_count: usize,
    pub penalty: ClaimPenalty,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_LLM_MODEL.to_string(),
            max_tokens: DEFAULT_LLM_MAX_TOKENS,
            select_count: DEFAULT_SELECT_COUNT,
            penalty: ClaimPenalty::default(),
        }
    }
}

/// A stage-3 input: the company and its stage-2 total.
#[derive(Debug, Clone, Copy)]
pub struct SelectorCandidate<'a> {
    pub company: &'a Company,
    pub deterministic: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Position in the candidate slice passed to [`LlmBatchSelector::select`].
    pub index: usize,
    pub company_id: CompanyId,
    /// Corrected model score in `[0, 1]`; 0 for fallback and top-up entries.
    pub llm_score: f32,
    pub reasons: Vec<String>,
    pub contradicted: bool,
    pub topped_up: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    Provider(String),
    BudgetExceeded,
    Unusable(SelectorError),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::Provider(err) => write!(f, "model call failed: {err}"),
            FallbackReason::BudgetExceeded => f.write_str("spend ceiling reached"),
            FallbackReason::Unusable(err) => write!(f, "model output rejected: {err}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    /// The model's answer, validated and sorted by corrected score.
    Model {
        selections: Vec<Selection>,
        /// Model entries that matched no candidate.
        dropped: usize,
        cache_hit: bool,
    },
    /// Top candidates by deterministic score.
    Fallback {
        selections: Vec<Selection>,
        reason: FallbackReason,
    },
}

impl SelectionOutcome {
    pub fn selections(&self) -> &[Selection] {
        match self {
            SelectionOutcome::Model { selections, .. }
            | SelectionOutcome::Fallback { selections, .. } => selections,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, SelectionOutcome::Fallback { .. })
    }

    pub fn fallback_reason(&self) -> Option<&FallbackReason> {
        match self {
            SelectionOutcome::Fallback { reason, .. } => Some(reason),
            SelectionOutcome::Model { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LlmBatchSelector {
    config: SelectorConfig,
}

impl LlmBatchSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    #[instrument(skip_all, fields(incentive_id = %incentive.id, candidates = candidates.len()))]
    pub async fn select<P: LlmProvider>(
        &self,
        scope: &LedgerScope<'_>,
        provider: &P,
        incentive: &Incentive,
        candidates: &[SelectorCandidate<'_>],
    ) -> SelectionOutcome {
        let want = self.config.select_count.min(candidates.len());
        if want == 0 {
            return SelectionOutcome::Model {
                selections: Vec::new(),
                dropped: 0,
                cache_hit: false,
            };
        }

        let companies: Vec<&Company> = candidates.iter().map(|c| c.company).collect();
        let request = CompletionRequest::new(
            self.config.model.clone(),
            build_prompt(incentive, &companies, want),
            self.config.max_tokens,
        );

        let response = match scope.complete(provider, &request).await {
            Ok(response) => response,
            Err(err) => {
                let reason = if err.is_budget() {
                    FallbackReason::BudgetExceeded
                } else {
                    FallbackReason::Provider(err.to_string())
                };
                warn!(%reason, "Selection falling back to deterministic ranking");
                return self.fallback(candidates, want, reason);
            }
        };

        match self.interpret(incentive, candidates, want, &response.value) {
            Ok((selections, dropped)) => {
                info!(
                    selected = selections.len(),
                    dropped,
                    contradicted = selections.iter().filter(|s| s.contradicted).count(),
                    cache_hit = response.cache_hit,
                    "Model selection accepted"
                );
                SelectionOutcome::Model {
                    selections,
                    dropped,
                    cache_hit: response.cache_hit,
                }
            }
            Err(err) => {
                scope
                    .reject_completion(
                        &response.key,
                        &request.model,
                        &response.value,
                        &err.to_string(),
                    )
                    .await;
                let reason = FallbackReason::Unusable(err);
                warn!(%reason, "Selection falling back to deterministic ranking");
                self.fallback(candidates, want, reason)
            }
        }
    }

    /// Turns completion text into exactly `want` validated selections.
    pub fn interpret(
        &self,
        incentive: &Incentive,
        candidates: &[SelectorCandidate<'_>],
        want: usize,
        text: &str,
    ) -> Result<(Vec<Selection>, usize), SelectorError> {
        let raw = parse_selections(text)?;
        if raw.len() != want {
            return Err(SelectorError::WrongArity {
                expected: want,
                got: raw.len(),
            });
        }

        let companies: Vec<&Company> = candidates.iter().map(|c| c.company).collect();
        let profile = incentive.profile.as_ref();
        let mut taken = vec![false; candidates.len()];
        let mut selections = Vec::with_capacity(want);
        let mut dropped = 0;

        for entry in raw {
            let Some(index) = fuzzy::resolve(&entry, &companies, &taken) else {
                debug!(name = ?entry.name, id = ?entry.id, "Dropping unmatched model selection");
                dropped += 1;
                continue;
            };
            taken[index] = true;

            let company = companies[index];
            let reasons: Vec<String> = entry
                .reasons
                .into_iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .take(MAX_LLM_REASONS)
                .collect();

            let checked = validate_claims(
                profile,
                company,
                clamp_score(entry.score),
                reasons,
                self.config.penalty,
            );
            if checked.contradicted {
                warn!(company_id = %company.id, "Model made a false eligibility claim; penalized");
            }

            selections.push(Selection {
                index,
                company_id: company.id,
                llm_score: checked.score,
                reasons: checked.reasons,
                contradicted: checked.contradicted,
                topped_up: false,
            });
        }

        for index in deterministic_order(candidates) {
            if selections.len() >= want {
                break;
            }
            if taken[index] {
                continue;
            }
            taken[index] = true;
            selections.push(Selection {
                index,
                company_id: candidates[index].company.id,
                llm_score: 0.0,
                reasons: vec![TOP_UP_REASON.to_string()],
                contradicted: false,
                topped_up: true,
            });
        }

        selections.sort_by(|a, b| b.llm_score.total_cmp(&a.llm_score));
        Ok((selections, dropped))
    }

    fn fallback(
        &self,
        candidates: &[SelectorCandidate<'_>],
        want: usize,
        reason: FallbackReason,
    ) -> SelectionOutcome {
        let tag = format!("Deterministic fallback ({reason})");
        let selections = deterministic_order(candidates)
            .into_iter()
            .take(want)
            .map(|index| Selection {
                index,
                company_id: candidates[index].company.id,
                llm_score: 0.0,
                reasons: vec![tag.clone()],
                contradicted: false,
                topped_up: false,
            })
            .collect();

        SelectionOutcome::Fallback { selections, reason }
    }
}

/// Candidate indices by deterministic score, ties in input order.
fn deterministic_order(candidates: &[SelectorCandidate<'_>]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| candidates[b].deterministic.cmp(&candidates[a].deterministic));
    order
}

fn clamp_score(score: Option<f64>) -> f32 {
    match score {
        Some(s) if s.is_finite() => s.clamp(0.0, 1.0) as f32,
        _ => 0.0,
    }
}
